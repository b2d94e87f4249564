mod common;
mod enumeration;
mod file_ops;
mod illusion;
