pub mod models {
    pub mod state;
    pub mod tado;
}

pub mod client;
pub mod config;
pub mod host;
pub mod utils;

pub mod sync {
    pub mod engine;
    pub mod events;
    pub mod parse;
    pub mod registry;
    pub mod runtime;
    pub mod scheduler;
    pub mod webhooks;
}

pub mod device {
    pub mod capabilities;
    pub mod pairing;
    pub mod tado_device;
}

#[cfg(test)]
mod testing;
