pub(crate) mod client;
mod notification;

pub use client::{GithubClient, default_token_from_env};
pub use notification::*;
