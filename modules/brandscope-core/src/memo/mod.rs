mod builder;
mod memo_cache;

pub use builder::{MemoBuilder, MemoKey};
pub use memo_cache::{Cached, MemoCache};
