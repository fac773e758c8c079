mod execution;
mod flags;
mod order_status;
mod order_type;
mod side;
mod time_in_force;

pub use execution::{Execution, avg_price, total_qty};
pub use flags::OrderFlags;
pub use order_status::OrderStatus;
pub use order_type::OrderType;
pub use side::Side;
pub use time_in_force::TimeInForce;
