//! Interface opening for the rservod CLI
//!
//! Every `-i` argument names one adapter and its options, such as
//! `linux_i2c:dev=/dev/i2c-1`. This crate turns those strings into
//! [`Interface`](rservo_core::interface::Interface) slots, in order, so the
//! CLI never touches the adapter crates directly.
//!
//! ```text
//!   -i dummy -i serial:dev=/dev/ttyUSB0
//!        │            │
//!        ▼            ▼
//!   [1 gpio, 2 i2c, 3 uart, 4 uart]   <- InterfacePool, numbered from 1
//! ```

mod registry;

pub use registry::{
    available_interfaces, interface_names_short, open_interface, open_pool, parse_interface_params,
    InterfaceInfo, InterfaceParams,
};
