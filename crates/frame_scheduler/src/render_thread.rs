use std::fmt;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, bounded, select};

use crate::{FrameDriver, FrameScheduler, FrameSchedulerConfig};

#[derive(Debug)]
pub enum RenderThreadError<E> {
    Driver(E),
    Panicked,
}

impl<E: fmt::Display> fmt::Display for RenderThreadError<E> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Driver(error) => write!(formatter, "render thread failed: {error}"),
            Self::Panicked => write!(formatter, "render thread panicked"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RenderThreadError<E> {}

/// Owns the background thread that runs the driver. The thread idles on
/// the wake mailbox and the terminate channel; it never polls.
pub struct RenderThread<D: FrameDriver> {
    terminate_sender: Sender<()>,
    join_handle: Option<JoinHandle<Result<D, D::Error>>>,
}

impl<D> RenderThread<D>
where
    D: FrameDriver + Send + 'static,
    D::Error: Send + 'static,
{
    pub fn spawn(
        scheduler: FrameScheduler,
        driver: D,
        config: &FrameSchedulerConfig,
    ) -> std::io::Result<Self> {
        let (terminate_sender, terminate_receiver) = bounded(1);
        let initial_frame = config.initial_frame;
        let join_handle = std::thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || render_loop(scheduler, driver, terminate_receiver, initial_frame))?;
        Ok(Self {
            terminate_sender,
            join_handle: Some(join_handle),
        })
    }
}

impl<D: FrameDriver> RenderThread<D> {
    pub fn is_finished(&self) -> bool {
        self.join_handle
            .as_ref()
            .is_none_or(|join_handle| join_handle.is_finished())
    }

    /// Signals termination, joins, and hands the driver back.
    pub fn stop(mut self) -> Result<D, RenderThreadError<D::Error>> {
        let _ = self.terminate_sender.try_send(());
        let join_handle = self
            .join_handle
            .take()
            .expect("render thread handle present until stop");
        match join_handle.join() {
            Ok(Ok(driver)) => Ok(driver),
            Ok(Err(error)) => Err(RenderThreadError::Driver(error)),
            Err(_) => Err(RenderThreadError::Panicked),
        }
    }
}

impl<D: FrameDriver> Drop for RenderThread<D> {
    fn drop(&mut self) {
        let Some(join_handle) = self.join_handle.take() else {
            return;
        };
        let _ = self.terminate_sender.try_send(());
        match join_handle.join() {
            Ok(Ok(_)) => {}
            Ok(Err(error)) => log::error!("render thread ended with error: {error}"),
            Err(_) => log::error!("render thread panicked"),
        }
    }
}

fn render_loop<D: FrameDriver>(
    scheduler: FrameScheduler,
    mut driver: D,
    terminate_receiver: Receiver<()>,
    initial_frame: bool,
) -> Result<D, D::Error> {
    driver.setup()?;
    if initial_frame {
        scheduler.mark_dirty();
    }
    let wake_receiver = scheduler.wake_receiver().clone();
    loop {
        select! {
            recv(terminate_receiver) -> _ => break,
            recv(wake_receiver) -> message => {
                if message.is_err() {
                    break;
                }
                if let Err(error) = scheduler.on_wake(&mut driver) {
                    log::error!("render thread stopping: {error}");
                    driver.teardown();
                    return Err(error);
                }
            }
        }
    }
    driver.teardown();
    Ok(driver)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::{Duration, Instant};

    use super::*;
    use crate::{FrameRequester, SwapStatus};

    struct ThreadDriver {
        renders: Arc<AtomicU32>,
        fail_on_render: bool,
        torn_down: bool,
    }

    impl FrameDriver for ThreadDriver {
        type Error = String;

        fn has_surface_area(&self) -> bool {
            true
        }

        fn prepare(&mut self, _requester: &FrameRequester) -> Result<(), Self::Error> {
            Ok(())
        }

        fn render(&mut self, _requester: &FrameRequester) -> Result<(), Self::Error> {
            if self.fail_on_render {
                return Err("device lost".to_owned());
            }
            self.renders.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn present(&mut self) -> Result<SwapStatus, Self::Error> {
            Ok(SwapStatus::Completed)
        }

        fn teardown(&mut self) {
            self.torn_down = true;
        }
    }

    fn wait_until(condition: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn thread_draws_initial_frame_and_returns_driver_on_stop() {
        let renders = Arc::new(AtomicU32::new(0));
        let scheduler = FrameScheduler::new();
        let thread = RenderThread::spawn(
            scheduler.clone(),
            ThreadDriver {
                renders: Arc::clone(&renders),
                fail_on_render: false,
                torn_down: false,
            },
            &FrameSchedulerConfig::default(),
        )
        .expect("spawn render thread");

        wait_until(|| renders.load(Ordering::SeqCst) == 1);
        scheduler.mark_dirty();
        wait_until(|| renders.load(Ordering::SeqCst) == 2);

        let driver = thread.stop().expect("stop render thread");
        assert!(driver.torn_down);
    }

    #[test]
    fn fatal_render_error_is_returned_on_stop() {
        let scheduler = FrameScheduler::new();
        let thread = RenderThread::spawn(
            scheduler,
            ThreadDriver {
                renders: Arc::new(AtomicU32::new(0)),
                fail_on_render: true,
                torn_down: false,
            },
            &FrameSchedulerConfig::default(),
        )
        .expect("spawn render thread");

        wait_until(|| thread.is_finished());
        match thread.stop() {
            Err(RenderThreadError::Driver(message)) => assert_eq!(message, "device lost"),
            other => panic!("unexpected stop result: {:?}", other.map(|_| ())),
        }
    }
}
