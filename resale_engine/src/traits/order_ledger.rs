use crate::{
    db_types::{NewOrder, Order, OrderStatus, Partition},
    traits::{CancelOutcome, LedgerError},
};

/// Behaviour for the order table and its archive partitions.
#[allow(async_fn_in_trait)]
pub trait OrderLedger: Clone {
    /// Stores a new order in the active partition. The call is idempotent: if an order with the same code already
    /// exists in any partition, nothing is written and the second value is `false`.
    async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), LedgerError>;

    /// Fetches an order from the active partition. Codes are matched case-insensitively.
    async fn fetch_order(&self, order_code: &str) -> Result<Option<Order>, LedgerError>;

    /// Fetches an order from an archive partition.
    async fn fetch_archived_order(&self, order_code: &str, partition: Partition) -> Result<Option<Order>, LedgerError>;

    /// The partition currently holding the order, if any.
    async fn locate_order(&self, order_code: &str) -> Result<Option<Partition>, LedgerError>;

    /// Every order in the active partition.
    async fn fetch_active_orders(&self) -> Result<Vec<Order>, LedgerError>;

    /// Sets the status of a single order. If `expected` is given, the update only lands while the order is in that
    /// status. Returns whether a row changed.
    async fn transition_status(
        &self,
        order_code: &str,
        expected: Option<OrderStatus>,
        status: OrderStatus,
    ) -> Result<bool, LedgerError>;

    /// Sets the check flag, but only while it still holds `expected`. Returns whether a row changed.
    async fn set_check_flag(
        &self,
        order_code: &str,
        expected: Option<bool>,
        flag: Option<bool>,
    ) -> Result<bool, LedgerError>;

    /// Moves Canceled or Refunded orders into the canceled partition, in a single transaction.
    async fn cancel_orders(&self, order_codes: &[String]) -> Result<CancelOutcome, LedgerError>;
}
