mod listing;
mod pool;
mod runner;
