//! Domain model module declarations.

pub mod confirmation;
pub mod event;
pub mod message;
pub mod mode;
pub mod notification;
pub mod session;
pub mod status;
pub mod stream;
