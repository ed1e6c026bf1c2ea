pub mod catalog;
pub mod clock;
pub mod notifier;
pub mod reservation;
pub mod settlement;
pub mod sweeper;

pub use catalog::SeatCatalog;
pub use clock::{Clock, SystemClock};
pub use notifier::TicketNotifier;
pub use reservation::ReservationLedger;
pub use settlement::CheckoutService;
pub use sweeper::run_sweeper;
