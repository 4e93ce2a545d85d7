//! Примитивы синхронизации потоков ядра.
//!
//! Содержит интрузивный двусвязный список, на котором построены все очереди ожидания,
//! семафор, блокировку с
//! [наследованием приоритетов](https://en.wikipedia.org/wiki/Priority_inheritance)
//! и условную переменную.
//!
//! Создание потоков, их планирование, запрещение прерываний и переключение контекста
//! остаются за внешним планировщиком, который реализует типаж [`Scheduler`].

#![deny(warnings)]
#![no_std]
#![warn(clippy::missing_docs_in_private_items)]
#![warn(missing_docs)]

/// Коллекции элементов.
pub mod collections;

/// Перечисление для возможных ошибок [`Error`] и соответствующий [`Result`].
pub mod error;

/// Поддержка журналирования макросами библиотеки [`tracing`].
pub mod log;

/// Примитивы синхронизации [`Semaphore`], [`Lock`] и [`Condition`].
pub mod sync;

/// Поля потока, которыми пользуются примитивы синхронизации,
/// и контракт внешнего планировщика [`Scheduler`].
pub mod thread;

pub use collections::{
    List,
    ListElem,
};
pub use error::{
    Error,
    Result,
};
pub use sync::{
    Condition,
    InterruptGuard,
    Lock,
    Semaphore,
};
pub use thread::{
    InterruptLevel,
    Priority,
    Scheduler,
    Thread,
    Tid,
};
