/// Processor interrupt enable/disable, the `splhigh()` / `splx()` pair.
///
/// The VM code never touches the status register itself; the platform layer
/// (or a simulator) implements this trait. Implementations must be callable
/// from trap context and must never block.
pub trait InterruptControl {
    /// Disables interrupts and returns whether they were enabled before the call.
    fn disable(&self) -> bool;

    /// Enables interrupts.
    fn enable(&self);
}

/// RAII guard that disables interrupts on creation and restores them on drop.
///
/// Interrupts are re-enabled on drop **only** if they were enabled when the
/// guard was created, so guards nest correctly.
///
/// # Examples
///
/// ```
/// use core::cell::Cell;
/// use kernel_sync::{InterruptControl, IrqGuard};
///
/// struct Flag(Cell<bool>);
///
/// impl InterruptControl for Flag {
///     fn disable(&self) -> bool {
///         self.0.replace(false)
///     }
///     fn enable(&self) {
///         self.0.set(true);
///     }
/// }
///
/// let cpu = Flag(Cell::new(true));
/// {
///     let _outer = IrqGuard::new(&cpu);
///     {
///         let _inner = IrqGuard::new(&cpu);
///         assert!(!cpu.0.get());
///     }
///     // the inner guard found interrupts already off and left them off
///     assert!(!cpu.0.get());
/// }
/// assert!(cpu.0.get());
/// ```
pub struct IrqGuard<'a, I: InterruptControl + ?Sized> {
    ctl: &'a I,
    /// Whether interrupts were enabled when the guard was created.
    were_enabled: bool,
}

impl<'a, I: InterruptControl + ?Sized> IrqGuard<'a, I> {
    #[inline]
    #[must_use]
    pub fn new(ctl: &'a I) -> Self {
        let were_enabled = ctl.disable();
        Self { ctl, were_enabled }
    }

    #[inline]
    #[must_use]
    pub const fn were_enabled(&self) -> bool {
        self.were_enabled
    }
}

impl<I: InterruptControl + ?Sized> Drop for IrqGuard<'_, I> {
    fn drop(&mut self) {
        if self.were_enabled {
            self.ctl.enable();
        }
    }
}
