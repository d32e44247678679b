pub mod coordinator;
pub mod discovery;
pub mod enumerator;
pub mod probe;
pub mod sink;
pub mod task;
pub mod vendors;
