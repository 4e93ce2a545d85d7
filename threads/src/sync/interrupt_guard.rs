use crate::thread::{
    InterruptLevel,
    Scheduler,
};

/// Запрещает прерывания на время своего существования.
///
/// - Запоминает состояние флага разрешения прерываний в момент создания.
/// - После чего запрещает прерывания.
/// - Автоматически возвращает флаг разрешения прерываний
///   в исходное состояние в реализации типажа [`Drop`],
///   в том числе при раскрутке стека паникой.
///
/// Вложенные [`InterruptGuard`] корректны,
/// если разрушаются в порядке, обратном порядку создания.
pub struct InterruptGuard<'a, S: Scheduler + ?Sized> {
    /// Планировщик, который управляет флагом разрешения прерываний.
    scheduler: &'a S,

    /// Состояние флага в момент создания.
    previous: InterruptLevel,
}

impl<'a, S: Scheduler + ?Sized> InterruptGuard<'a, S> {
    /// Создаёт [`InterruptGuard`].
    ///
    /// - Запоминает состояние флага разрешения прерываний в момент создания.
    /// - После чего запрещает прерывания.
    pub fn new(scheduler: &'a S) -> Self {
        let previous = scheduler.disable_interrupts();

        Self {
            scheduler,
            previous,
        }
    }

    /// Состояние флага разрешения прерываний, которое будет восстановлено.
    pub fn previous(&self) -> InterruptLevel {
        self.previous
    }
}

impl<S: Scheduler + ?Sized> Drop for InterruptGuard<'_, S> {
    /// Возвращает флаг разрешения прерываний в исходное состояние,
    /// в котором он находился до создания этого [`InterruptGuard`].
    fn drop(&mut self) {
        self.scheduler.set_interrupts(self.previous);
    }
}
