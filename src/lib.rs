#![forbid(unsafe_code)]

pub mod app;
pub mod cache;
pub mod catalog;
pub mod classify;
pub mod cli;
pub mod config;
pub mod curation;
pub mod etsy;
pub mod export;
pub mod formats;
pub mod inspect;
pub mod logging;
pub mod normalize;
pub mod notify;
pub mod orders;
pub mod source;
pub mod subscribers;
pub mod text;
