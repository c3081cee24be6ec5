mod mocks;

mod namecache_tests;
mod publisher_tests;
mod store_tests;
