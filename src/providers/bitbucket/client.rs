mod core;
mod logs;
mod pipelines;
mod test_reports;

pub use self::core::BitbucketClient;
