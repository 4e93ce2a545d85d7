/// Условная переменная [`Condition`].
pub mod condition;

/// Протокол пожертвования приоритетов между потоками,
/// которые ждут блокировок, и владельцами этих блокировок.
pub mod donation;

/// Запрещение прерываний на время существования [`InterruptGuard`].
pub mod interrupt_guard;

/// Блокировка [`Lock`] с пожертвованием приоритетов.
pub mod lock;

/// Семафор [`Semaphore`].
pub mod semaphore;

pub use condition::Condition;
pub use interrupt_guard::InterruptGuard;
pub use lock::Lock;
pub use semaphore::Semaphore;
