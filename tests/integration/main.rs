//! Host-side integration tests for the controller core.
//!
//! Everything runs against mock ports — no GPIO, no network. Timer
//! behaviour is exercised in real time with small session budgets.


mod controller_tests;
mod training_tests;
