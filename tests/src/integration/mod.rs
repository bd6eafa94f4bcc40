//! Integration flows across lock control, loadcells and transactions.

#[cfg(test)]
mod fixtures;

#[cfg(test)]
mod ingestion_modes;
#[cfg(test)]
mod issue_flow;
#[cfg(test)]
mod lock_round_trip;
