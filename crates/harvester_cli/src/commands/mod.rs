pub(crate) mod clone;
pub(crate) mod meta;
pub(crate) mod shared;
pub(crate) mod watch;
