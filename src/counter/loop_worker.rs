use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::detection::DetectionInput;

use super::controller::CounterController;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

/// Feeds every input of one run to the controller, one tick at a time.
///
/// Cancellation wins over a pending input so a stop halts counting
/// immediately. When the source runs dry `source_closed` is cancelled and the
/// loop exits; the run itself stays open until it is stopped.
pub async fn detection_loop(
    run_id: String,
    controller: CounterController,
    mut frames: mpsc::Receiver<DetectionInput>,
    cancel_token: CancellationToken,
    source_closed: CancellationToken,
) {
    let mut ticks: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("detection loop for run {run_id} shutting down after {ticks} ticks");
                break;
            }
            input = frames.recv() => {
                let Some(input) = input else {
                    log_info!("frame source for run {run_id} closed after {ticks} ticks");
                    source_closed.cancel();
                    break;
                };

                ticks = ticks.wrapping_add(1);
                if let Err(err) = controller.on_tick(input).await {
                    log_error!("tick {ticks} of run {run_id} failed: {err}");
                }
            }
        }
    }
}
