mod helpers;

mod enrichment_test;
mod fetch_worker_test;
mod frontier_test;
