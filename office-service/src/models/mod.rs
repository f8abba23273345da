//! Domain models for office-service.

mod customer;
mod income;
mod invoice;
mod managed_transaction;
mod money;
mod service;
mod task;
mod ticket;
mod user;

pub use customer::{
    CreateContact, CreateCustomer, Customer, CustomerContact, CustomerNote, UpdateCustomer,
};
pub use income::{Income, IncomeEntry, IncomeSource, ListIncomeFilter};
pub use invoice::{
    CreateInvoice, CreatePayment, Invoice, InvoiceDetail, InvoiceItem, InvoiceLineRequest,
    InvoicePayment, InvoiceStatus, ListInvoicesFilter, PaymentPosition,
};
pub use managed_transaction::{
    CollectFee, CreateManagedTransaction, ListManagedFilter, ManagedStatus, ManagedTransaction,
    UpdateManagedTransaction,
};
pub use money::{money_column, money_to_column, round2, zero};
pub use service::{CreateService, GovFeeType, Service, UpdateService};
pub use task::{CreateTask, ListTasksFilter, Task, TaskPriority, TaskStatus, UpdateTask};
pub use ticket::{CreateTicket, ListTicketsFilter, Ticket, TicketStatus};
pub use user::{CreateUser, Role, UpdateUser, User, UserView, PERMISSION_MANAGE_CATALOG};
