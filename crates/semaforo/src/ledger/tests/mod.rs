mod common;
mod learning;
