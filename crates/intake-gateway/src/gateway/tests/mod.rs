mod common;
mod inference;
