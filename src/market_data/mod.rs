// Market data module entrypoint
pub mod adapters;  // price sources (HTTP price API)
pub mod router;    // one polling task per (asset, market), feeding the ledger
