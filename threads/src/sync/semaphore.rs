use core::{
    cell::Cell,
    fmt,
    pin::Pin,
};

use pin_project::pin_project;
use static_assertions::assert_impl_all;

use super::InterruptGuard;
use crate::{
    collections::{
        List,
        ListElem,
    },
    log::trace,
    thread::{
        Scheduler,
        Thread,
    },
};

/// [Семафор Дейкстры](https://en.wikipedia.org/wiki/Semaphore_(programming)) ---
/// неотрицательный счётчик с двумя атомарными операциями:
///   - [`Semaphore::down()`] ждёт, пока счётчик не станет положительным, и уменьшает его;
///   - [`Semaphore::up()`] увеличивает счётчик и будит один ждущий поток, если такой есть.
///
/// Ждущие потоки просыпаются в порядке убывания приоритета,
/// а при равных приоритетах --- в порядке очереди.
#[pin_project]
pub struct Semaphore {
    /// Текущее значение счётчика.
    value: Cell<usize>,

    /// Потоки, ждущие в [`Semaphore::down()`].
    #[pin]
    waiters: List,
}

impl Semaphore {
    /// Создаёт семафор с начальным значением `value`.
    /// Перед использованием семафор нужно закрепить и вызвать [`Semaphore::init()`].
    pub const fn new(value: usize) -> Self {
        Self {
            value: Cell::new(value),
            waiters: List::new(),
        }
    }

    /// Инициализирует закреплённый семафор.
    pub fn init(self: Pin<&Self>) {
        self.project_ref().waiters.init();
    }

    /// Ждёт, пока значение семафора не станет положительным, и уменьшает его.
    ///
    /// # Panics
    ///
    /// Паникует, если вызван из обработчика прерывания.
    pub fn down<S: Scheduler + ?Sized>(
        &self,
        scheduler: &S,
    ) {
        assert!(!scheduler.in_interrupt(), "Semaphore::down() in an interrupt handler");

        let _guard = InterruptGuard::new(scheduler);

        while self.value.get() == 0 {
            let current = scheduler.current();
            trace!(thread = %current, "blocked on a semaphore");

            // SAFETY: поток не может завершиться, пока ждёт, а семафор по контракту
            // живёт дольше своих ожидающих.
            unsafe {
                self.waiters.insert_ordered(current.elem(), by_priority);
            }

            scheduler.block();
        }

        self.value.set(self.value.get() - 1);
    }

    /// Уменьшает значение семафора, только если оно положительно.
    /// Возвращает `true` в случае успеха.
    ///
    /// Не блокируется, поэтому может вызываться из обработчика прерывания.
    pub fn try_down<S: Scheduler + ?Sized>(
        &self,
        scheduler: &S,
    ) -> bool {
        let _guard = InterruptGuard::new(scheduler);

        let value = self.value.get();
        if value > 0 {
            self.value.set(value - 1);
            true
        } else {
            false
        }
    }

    /// Увеличивает значение семафора и будит самый приоритетный ждущий поток.
    /// Если разбуженный поток важнее текущего, текущий уступает ему процессор.
    ///
    /// Может вызываться из обработчика прерывания.
    pub fn up<S: Scheduler + ?Sized>(
        &self,
        scheduler: &S,
    ) {
        let guard = InterruptGuard::new(scheduler);

        let woken = if self.waiters.is_empty() {
            None
        } else {
            // Приоритеты ждущих могли измениться из-за пожертвований.
            self.waiters.sort(by_priority);
            // SAFETY: в очереди ожидания состоят только `Thread::elem`.
            let thread = unsafe { Thread::from_elem(self.waiters.pop_front()) };
            trace!(%thread, "woken up by a semaphore");
            scheduler.unblock(thread);
            Some(thread)
        };

        self.value.set(self.value.get() + 1);

        let preempt = woken.is_some_and(|thread| thread.priority() > scheduler.current().priority());

        if preempt {
            if scheduler.in_interrupt() {
                scheduler.yield_on_return();
            } else {
                drop(guard);
                scheduler.yield_now();
            }
        }
    }

    /// Текущее значение семафора.
    pub fn value(&self) -> usize {
        self.value.get()
    }

    /// Количество ждущих потоков.
    pub fn waiter_count(&self) -> usize {
        self.waiters.len()
    }
}

impl fmt::Debug for Semaphore {
    fn fmt(
        &self,
        formatter: &mut fmt::Formatter,
    ) -> fmt::Result {
        formatter
            .debug_struct("Semaphore")
            .field("value", &self.value())
            .field("waiters", &self.waiter_count())
            .finish()
    }
}

/// См. [The Rustonomicon, "Send and Sync"](https://doc.rust-lang.org/nomicon/send-and-sync.html).
///
/// Состояние семафора меняется только при запрещённых прерываниях.
unsafe impl Send for Semaphore {
}

/// См. [The Rustonomicon, "Send and Sync"](https://doc.rust-lang.org/nomicon/send-and-sync.html).
unsafe impl Sync for Semaphore {
}

assert_impl_all!(Semaphore: Send, Sync);

/// Упорядочивает элементы [`Thread::elem()`] по убыванию приоритета потоков.
fn by_priority(
    a: &ListElem,
    b: &ListElem,
) -> bool {
    // SAFETY: в очередях ожидания состоят только `Thread::elem`.
    unsafe { Thread::from_elem(a).priority() > Thread::from_elem(b).priority() }
}
