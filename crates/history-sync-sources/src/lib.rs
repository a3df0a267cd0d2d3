pub mod bilibili;
pub mod clock;
pub mod error;
pub mod rate_limit;
pub mod traits;

pub use bilibili::BilibiliClient;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::FetchError;
pub use rate_limit::RateLimiter;
pub use traits::{FeedPage, HistoryFeed};
