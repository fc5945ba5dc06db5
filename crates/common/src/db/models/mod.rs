//! SeaORM entity models
//!
//! Database entities for InvoiceFlow

mod invoice;
mod issue;

pub use invoice::{
    Entity as InvoiceEntity,
    Model as Invoice,
    ActiveModel as InvoiceActiveModel,
    Column as InvoiceColumn,
    InvoiceStatus,
    ProcessingStatus,
};

pub use issue::{
    Entity as IssueEntity,
    Model as Issue,
    ActiveModel as IssueActiveModel,
    Column as IssueColumn,
};
