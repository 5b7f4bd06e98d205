mod common;

mod identity;
mod notification;
