pub mod auth;
pub mod domain;
pub mod fcm;
pub mod garde;
pub mod http;
pub mod nats;
pub mod postgres;
pub mod telemetry;
