pub mod heartbeat;
pub mod hw_init;
pub mod pwm;
pub mod status_led;
pub mod task_pin;
