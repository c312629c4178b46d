pub mod derivation_mapper;
pub mod distribution;
pub mod fee_stabilizer;
pub mod input_filter;
pub mod ledger;
pub mod output_addresses;
pub mod run_totals;
pub mod selection;
pub mod witness_cache;
