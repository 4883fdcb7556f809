pub mod clock;
pub mod console;
pub mod record_store;
pub mod role_probe;
pub mod secret_store;
pub mod wait;
