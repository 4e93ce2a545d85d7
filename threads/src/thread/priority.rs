use derive_more::Display;
use static_assertions::const_assert;

use crate::error::{
    Error,
    Error::InvalidArgument,
    Result,
};

/// Приоритет потока.
/// Чем больше значение, тем важнее поток.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[display("{}", _0)]
pub struct Priority(u8);

impl Priority {
    /// Наименьший допустимый приоритет.
    pub const MIN: Priority = Priority(0);

    /// Приоритет, с которым потоки создаются по умолчанию.
    pub const DEFAULT: Priority = Priority(31);

    /// Наибольший допустимый приоритет.
    pub const MAX: Priority = Priority(63);

    /// Создаёт приоритет со значением `priority`.
    ///
    /// Возвращает ошибку [`Error::InvalidArgument`],
    /// если `priority` больше [`Priority::MAX`].
    pub const fn new(priority: u8) -> Result<Self> {
        if priority <= Self::MAX.0 {
            Ok(Self(priority))
        } else {
            Err(InvalidArgument)
        }
    }

    /// Численное значение приоритета.
    pub const fn get(&self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u8> for Priority {
    type Error = Error;

    fn try_from(priority: u8) -> Result<Self> {
        Self::new(priority)
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}

const_assert!(Priority::MIN.get() < Priority::DEFAULT.get());
const_assert!(Priority::DEFAULT.get() < Priority::MAX.get());
