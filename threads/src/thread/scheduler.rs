use super::Thread;

/// Состояние флага разрешения прерываний.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InterruptLevel {
    /// Прерывания запрещены.
    Off,

    /// Прерывания разрешены.
    On,
}

/// Внешний планировщик потоков.
///
/// Примитивы синхронизации не создают потоки и не переключают контекст сами,
/// а обращаются за этим к планировщику.
/// Все очереди ожидания изменяются только при запрещённых прерываниях,
/// поэтому на однопроцессорной машине этого достаточно для взаимоисключения.
pub trait Scheduler {
    /// Текущий поток.
    fn current(&self) -> &Thread;

    /// Усыпляет текущий поток до вызова [`Scheduler::unblock()`] для него.
    /// Вызывается только при запрещённых прерываниях.
    fn block(&self);

    /// Делает заблокированный поток `thread` готовым к исполнению.
    /// Не вытесняет текущий поток.
    fn unblock(
        &self,
        thread: &Thread,
    );

    /// Уступает процессор, оставляя текущий поток готовым к исполнению.
    fn yield_now(&self);

    /// Просит уступить процессор при выходе из текущего обработчика прерывания.
    fn yield_on_return(&self);

    /// Возвращает `true`, если код исполняется в обработчике внешнего прерывания.
    fn in_interrupt(&self) -> bool;

    /// Запрещает прерывания и возвращает прежнее состояние флага.
    fn disable_interrupts(&self) -> InterruptLevel;

    /// Устанавливает флаг разрешения прерываний в состояние `level`.
    fn set_interrupts(
        &self,
        level: InterruptLevel,
    );
}
