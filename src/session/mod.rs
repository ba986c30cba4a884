pub(crate) mod host_loop;
pub(crate) mod opts;
pub(crate) mod present;
pub(crate) mod source;
