mod bitbucket;

pub use bitbucket::BitbucketProvider;
