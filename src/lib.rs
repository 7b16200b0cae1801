pub mod core {
    pub mod component;
    pub mod config;
    pub mod coordinator;
    pub mod error;
    pub mod verdict;
}

pub mod monitor;
pub mod remote;
pub mod report;
pub mod runners;
