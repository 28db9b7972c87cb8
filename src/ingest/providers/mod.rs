pub mod rss;

pub use rss::RssFeedSource;
