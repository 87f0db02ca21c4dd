//! Synchronization primitives.

use crate::error::Result;
use ash::vk;
use std::sync::Arc;

/// Wait with no timeout; reproduces the unbounded-wait default.
pub const WAIT_FOREVER: u64 = u64::MAX;

/// Create a semaphore.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    let create_info = vk::SemaphoreCreateInfo::default();
    let semaphore = device.create_semaphore(&create_info, None)?;
    Ok(semaphore)
}

/// Create a fence.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_fence(device: &ash::Device, signaled: bool) -> Result<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };

    let create_info = vk::FenceCreateInfo::default().flags(flags);
    let fence = device.create_fence(&create_info, None)?;
    Ok(fence)
}

/// Wait for a fence to be signaled.
///
/// # Safety
/// The device and fence must be valid.
pub unsafe fn wait_for_fence(device: &ash::Device, fence: vk::Fence, timeout_ns: u64) -> Result<()> {
    device.wait_for_fences(&[fence], true, timeout_ns)?;
    Ok(())
}

/// Reset a fence to unsignaled state.
///
/// # Safety
/// The device and fence must be valid.
pub unsafe fn reset_fence(device: &ash::Device, fence: vk::Fence) -> Result<()> {
    device.reset_fences(&[fence])?;
    Ok(())
}

/// A host-waitable completion signal.
///
/// The one blocking primitive in this crate. Waits take an explicit timeout;
/// passing [`WAIT_FOREVER`] reproduces the unbounded wait the frame loop
/// relies on, while tests can exercise bounded waits deterministically.
pub trait CompletionSignal {
    /// Block until the signal fires or the timeout elapses.
    fn wait(&self, timeout_ns: u64) -> Result<()>;

    /// Reset the signal to unsignaled.
    fn reset(&self) -> Result<()>;
}

/// A Vulkan fence as a completion signal.
pub struct FenceSignal {
    device: Arc<ash::Device>,
    fence: vk::Fence,
}

impl FenceSignal {
    /// Wrap a fence.
    ///
    /// The fence should be created pre-signaled when it guards a resource
    /// that is free on first acquire.
    pub fn new(device: Arc<ash::Device>, fence: vk::Fence) -> Self {
        Self { device, fence }
    }

    /// Get the native fence handle.
    pub fn fence(&self) -> vk::Fence {
        self.fence
    }

    /// Destroy the fence.
    ///
    /// # Safety
    /// The fence must not be in use by any pending submission.
    pub unsafe fn destroy(&self) {
        self.device.destroy_fence(self.fence, None);
    }
}

impl CompletionSignal for FenceSignal {
    fn wait(&self, timeout_ns: u64) -> Result<()> {
        unsafe { wait_for_fence(&self.device, self.fence, timeout_ns) }
    }

    fn reset(&self) -> Result<()> {
        unsafe { reset_fence(&self.device, self.fence) }
    }
}

/// Guards a resource with at most one outstanding use.
///
/// `acquire` blocks until the previous use completed, then arms the signal
/// for the next one. With the signal created pre-signaled, the first acquire
/// returns immediately. This is the fence gate that makes a command recorder
/// reusable: completion of submission *n* is guaranteed before recording of
/// submission *n+1* begins.
pub struct InFlightGuard<S: CompletionSignal> {
    signal: S,
}

impl<S: CompletionSignal> InFlightGuard<S> {
    /// Wrap a completion signal.
    pub fn new(signal: S) -> Self {
        Self { signal }
    }

    /// Wait for the prior use to complete and arm the signal again.
    pub fn acquire(&self, timeout_ns: u64) -> Result<()> {
        self.signal.wait(timeout_ns)?;
        self.signal.reset()
    }

    /// Access the wrapped signal.
    pub fn signal(&self) -> &S {
        &self.signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GpuError;
    use std::sync::{Condvar, Mutex};
    use std::time::{Duration, Instant};

    /// Host-side completion signal driven by tests.
    struct ManualSignal {
        state: Mutex<bool>,
        condvar: Condvar,
    }

    impl ManualSignal {
        fn new(signaled: bool) -> Self {
            Self {
                state: Mutex::new(signaled),
                condvar: Condvar::new(),
            }
        }

        fn fire(&self) {
            *self.state.lock().unwrap() = true;
            self.condvar.notify_all();
        }
    }

    impl CompletionSignal for &ManualSignal {
        fn wait(&self, timeout_ns: u64) -> Result<()> {
            let deadline = Duration::from_nanos(timeout_ns);
            let guard = self.state.lock().unwrap();
            let (guard, result) = self
                .condvar
                .wait_timeout_while(guard, deadline, |signaled| !*signaled)
                .unwrap();
            drop(guard);
            if result.timed_out() {
                return Err(GpuError::Vulkan(ash::vk::Result::TIMEOUT));
            }
            Ok(())
        }

        fn reset(&self) -> Result<()> {
            *self.state.lock().unwrap() = false;
            Ok(())
        }
    }

    #[test]
    fn first_acquire_of_signaled_guard_returns_immediately() {
        let signal = ManualSignal::new(true);
        let guard = InFlightGuard::new(&signal);
        guard.acquire(0).unwrap();
    }

    #[test]
    fn acquire_blocks_until_signal_fires() {
        let signal = ManualSignal::new(true);
        let guard = InFlightGuard::new(&signal);

        // First cycle: acquire consumes the pre-signaled state.
        guard.acquire(0).unwrap();

        let delay = Duration::from_millis(50);
        let started = Instant::now();
        std::thread::scope(|scope| {
            scope.spawn(|| {
                std::thread::sleep(delay);
                signal.fire();
            });

            // Second acquire must not return before the delayed signal.
            guard
                .acquire(Duration::from_secs(5).as_nanos() as u64)
                .unwrap();
        });

        assert!(
            started.elapsed() >= delay,
            "acquire returned before the completion signal fired"
        );
    }

    #[test]
    fn acquire_times_out_when_signal_never_fires() {
        let signal = ManualSignal::new(false);
        let guard = InFlightGuard::new(&signal);

        let result = guard.acquire(Duration::from_millis(10).as_nanos() as u64);
        assert!(result.is_err());
    }
}
