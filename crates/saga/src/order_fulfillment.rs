//! Order fulfillment saga constants.

/// The saga type identifier for order creation.
pub const SAGA_TYPE: &str = "CreateOrder";

/// Step name: sum the product prices.
pub const STEP_PRICE: &str = "price";

/// Step name: read the wallet and compare against the total.
pub const STEP_BALANCE_CHECK: &str = "balance_check";

/// Step name: debit the wallet.
pub const STEP_DEBIT: &str = "debit";

/// Step name: create the order record.
pub const STEP_REGISTER_ORDER: &str = "register_order";

/// Compensation step name: credit the debited amount back.
pub const STEP_COMPENSATE_CREDIT: &str = "compensate_credit";
