pub(crate) mod cpu;
pub(crate) mod device;
pub(crate) mod scripted;
