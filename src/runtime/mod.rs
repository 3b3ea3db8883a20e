//! Runtime adapters for the coroutine scheduler.

pub mod event_loop;

pub use event_loop::EventLoop;
