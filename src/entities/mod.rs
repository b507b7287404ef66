//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod adjustment_reason;
pub mod author;
pub mod book;
pub mod inventory_adjustment;
pub mod invoice;
pub mod invoice_item;
pub mod order;
pub mod order_item;
pub mod publisher;
pub mod transaction;
pub mod vendor;

// Re-export specific types to avoid conflicts
pub use adjustment_reason::{Entity as AdjustmentReason, Model as AdjustmentReasonModel};
pub use author::{Entity as Author, Model as AuthorModel};
pub use book::{Column as BookColumn, Entity as Book, Model as BookModel};
pub use inventory_adjustment::{
    Column as InventoryAdjustmentColumn, Entity as InventoryAdjustment,
    Model as InventoryAdjustmentModel,
};
pub use invoice::{Column as InvoiceColumn, Entity as Invoice, Model as InvoiceModel};
pub use invoice_item::{
    Column as InvoiceItemColumn, Entity as InvoiceItem, Model as InvoiceItemModel,
};
pub use order::{Column as OrderColumn, Entity as Order, Model as OrderModel, OrderState};
pub use order_item::{
    Column as OrderItemColumn, Entity as OrderItem, Model as OrderItemModel, ProductType,
};
pub use publisher::{Entity as Publisher, Model as PublisherModel};
pub use transaction::{
    Column as TransactionColumn, Entity as Transaction, Model as TransactionModel,
    TransactionStatus,
};
pub use vendor::{Entity as Vendor, Model as VendorModel};
