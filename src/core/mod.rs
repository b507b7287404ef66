/// Authors, publishers, vendors and books
pub mod catalog;

/// Book quantities and the adjustment audit trail
pub mod inventory;

/// Vendor invoices and restocking
pub mod invoice;

/// Order state machine and line items
pub mod order;

/// Cursor pagination over id-ordered listings
pub mod pagination;

/// Background polling of a single payment transaction
pub mod poller;

/// Serializable transaction scoping and conflict retry
pub mod storage;

/// Payment transactions synced with the terminal
pub mod transaction;
