mod config;
mod topic;
