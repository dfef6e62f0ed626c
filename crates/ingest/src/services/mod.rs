pub mod diaspora;
pub mod mastodon;
pub mod nodeinfo;
pub mod peertube;
