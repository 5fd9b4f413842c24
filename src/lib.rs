// ===============================
// src/lib.rs
// ===============================
pub mod domain;
pub mod error;
pub mod config;
pub mod metrics;
pub mod recorder;
pub mod feed;
pub mod ledger;
pub mod matching;
pub mod quoting;
pub mod gateway;       // trait + simulated venue (ledger + matching)
pub mod mexc;          // helper (signer/models) untuk MEXC
pub mod gateway_mexc;  // MEXC spot REST (live)
pub mod report;
pub mod session;
