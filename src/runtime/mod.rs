pub(crate) mod arena;
pub(crate) mod collector;
pub(crate) mod controller;
pub(crate) mod executor;
pub(crate) mod result;
