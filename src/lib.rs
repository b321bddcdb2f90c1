pub mod batch;
pub mod config;
pub mod error;
pub mod export;
pub mod fair_odds;
pub mod history;
pub mod logging;
pub mod market;
pub mod overview;
pub mod poisson;
pub mod predictor;
pub mod ranker;
pub mod team_index;
