use core::{
    cell::Cell,
    fmt,
    pin::Pin,
    ptr::{
        self,
        NonNull,
    },
};

use pin_project::pin_project;
use static_assertions::assert_impl_all;

use super::{
    InterruptGuard,
    Semaphore,
    donation,
};
use crate::{
    log::trace,
    thread::{
        Scheduler,
        Thread,
    },
};

/// Блокировка --- [семафор](Semaphore) с начальным значением 1,
/// который освобождает только захвативший его поток.
///
/// Не рекурсивна: повторный захват владельцем приводит к панике.
///
/// Поток, который ждёт занятую блокировку, жертвует свой приоритет её владельцу
/// и далее по цепочке владельцев блокировок, которые тот ждёт,
/// см. [`donation`].
/// Так более важный поток не ждёт бесконечно менее важного,
/// которого вытесняют потоки среднего приоритета.
#[pin_project]
pub struct Lock {
    /// Семафор, значение которого равно 1 тогда и только тогда,
    /// когда блокировка свободна.
    #[pin]
    semaphore: Semaphore,

    /// Владелец блокировки.
    holder: Cell<Option<NonNull<Thread>>>,
}

impl Lock {
    /// Создаёт свободную блокировку.
    /// Перед использованием блокировку нужно закрепить и вызвать [`Lock::init()`].
    pub const fn new() -> Self {
        Self {
            semaphore: Semaphore::new(1),
            holder: Cell::new(None),
        }
    }

    /// Инициализирует закреплённую блокировку.
    pub fn init(self: Pin<&Self>) {
        self.project_ref().semaphore.init();
    }

    /// Захватывает блокировку, при необходимости дожидаясь её освобождения.
    /// Пока ждёт, жертвует свой приоритет владельцу.
    ///
    /// # Panics
    ///
    /// Паникует, если вызван из обработчика прерывания
    /// или если текущий поток уже владеет блокировкой.
    pub fn acquire<S: Scheduler + ?Sized>(
        &self,
        scheduler: &S,
    ) {
        assert!(!scheduler.in_interrupt(), "Lock::acquire() in an interrupt handler");
        assert!(!self.held_by_current(scheduler), "recursive Lock::acquire()");

        let _guard = InterruptGuard::new(scheduler);
        let current = scheduler.current();

        if let Some(holder) = self.holder() {
            trace!(thread = %current, %holder, "waits for a lock");

            current.set_waiting_on(Some(self));
            // SAFETY: поток остаётся в списке доноров владельца, пока ждёт блокировку,
            // а владелец удаляет его оттуда в `Lock::release()`.
            unsafe {
                holder.donations().push_back(current.donation_elem());
            }
            donation::donate(current);
        }

        self.semaphore.down(scheduler);

        current.set_waiting_on(None);
        self.holder.set(Some(NonNull::from(current)));
    }

    /// Захватывает блокировку, только если она свободна.
    /// Возвращает `true` в случае успеха.
    /// Ничего не жертвует.
    ///
    /// # Panics
    ///
    /// Паникует, если текущий поток уже владеет блокировкой.
    pub fn try_acquire<S: Scheduler + ?Sized>(
        &self,
        scheduler: &S,
    ) -> bool {
        assert!(!self.held_by_current(scheduler), "recursive Lock::try_acquire()");

        let acquired = self.semaphore.try_down(scheduler);
        if acquired {
            self.holder.set(Some(NonNull::from(scheduler.current())));
        }

        acquired
    }

    /// Освобождает блокировку, отказывается от пожертвованных ради неё приоритетов
    /// и будит самый приоритетный из ждущих её потоков.
    ///
    /// # Panics
    ///
    /// Паникует, если текущий поток не владеет блокировкой.
    pub fn release<S: Scheduler + ?Sized>(
        &self,
        scheduler: &S,
    ) {
        assert!(
            self.held_by_current(scheduler),
            "Lock::release() by a thread that does not hold the lock",
        );

        let _guard = InterruptGuard::new(scheduler);
        let current = scheduler.current();

        donation::revoke(current, self);
        donation::reset_priority(current);

        self.holder.set(None);
        self.semaphore.up(scheduler);
    }

    /// Возвращает `true`, если блокировкой владеет текущий поток.
    /// Про другие потоки так спрашивать нельзя --- ответ устарел бы сразу после проверки.
    pub fn held_by_current<S: Scheduler + ?Sized>(
        &self,
        scheduler: &S,
    ) -> bool {
        self.holder().is_some_and(|holder| ptr::eq(holder, scheduler.current()))
    }

    /// Владелец блокировки.
    pub fn holder(&self) -> Option<&Thread> {
        // SAFETY: поток не может завершиться, пока владеет блокировкой.
        self.holder.get().map(|holder| unsafe { holder.as_ref() })
    }
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Lock {
    fn fmt(
        &self,
        formatter: &mut fmt::Formatter,
    ) -> fmt::Result {
        formatter
            .debug_struct("Lock")
            .field("holder", &self.holder())
            .field("semaphore", &self.semaphore)
            .finish()
    }
}

/// См. [The Rustonomicon, "Send and Sync"](https://doc.rust-lang.org/nomicon/send-and-sync.html).
///
/// Владелец меняется только при запрещённых прерываниях.
unsafe impl Send for Lock {
}

/// См. [The Rustonomicon, "Send and Sync"](https://doc.rust-lang.org/nomicon/send-and-sync.html).
unsafe impl Sync for Lock {
}

assert_impl_all!(Lock: Send, Sync);
