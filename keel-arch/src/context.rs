//! Opaque register-save area for coroutine switching.
//!
//! A [`Context`] holds whatever a platform's trampoline needs to suspend
//! and resume one kernel coroutine: non-volatile registers and a stack
//! pointer on real hardware, bookkeeping in the host simulator. The core
//! never interprets the contents; only
//! [`Platform::prepare_context`](crate::platform::Platform::prepare_context)
//! and its siblings read or write them.

/// Number of machine words in a context save area.
///
/// Sized for the largest supported trampoline (callee-saved register file
/// plus stack pointer and entry scratch).
pub const CONTEXT_WORDS: usize = 16;

/// Saved execution state of one suspended coroutine.
#[derive(Debug)]
#[repr(C, align(16))]
pub struct Context {
    words: [usize; CONTEXT_WORDS],
}

impl Context {
    /// A context with all words cleared. Not runnable until prepared by
    /// the platform trampoline.
    pub const fn zeroed() -> Self {
        Self {
            words: [0; CONTEXT_WORDS],
        }
    }

    /// Raw words, for platform trampolines.
    #[inline]
    pub fn words(&self) -> &[usize; CONTEXT_WORDS] {
        &self.words
    }

    /// Raw words, mutable, for platform trampolines.
    #[inline]
    pub fn words_mut(&mut self) -> &mut [usize; CONTEXT_WORDS] {
        &mut self.words
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::zeroed()
    }
}
