use tokio::sync::broadcast::{error::RecvError, Receiver};
use tracing::warn;

use crate::session::SessionSnapshot;

/// Renderer fed with session snapshots. Implementations must derive all output
/// from the snapshot they are given.
pub trait View: Send {
    fn render(&mut self, snapshot: &SessionSnapshot);
}

/// Renders every snapshot published on `events` until the controller that owns
/// the sender is dropped. Returns the number of snapshots rendered.
pub async fn drive_view<V: View + ?Sized>(
    mut events: Receiver<SessionSnapshot>,
    view: &mut V,
) -> usize {
    let mut rendered = 0;
    loop {
        match events.recv().await {
            Ok(snapshot) => {
                view.render(&snapshot);
                rendered += 1;
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "view fell behind; older snapshots dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }
    rendered
}
