//! Primary-surface draw dispatch with frame mirroring

use super::toolkit::{DrawCall, DrawOutcome, FlipOptions, SurfaceId, Toolkit, ToolkitError};
use crate::geometry::Color;
use crate::session::Notification;
use log::trace;

/// Secondary display and the offscreen copy of the last presented primary frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mirror {
    pub secondary: SurfaceId,
    pub duplicate: SurfaceId,
}

/// Result of one dispatched call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dispatched {
    pub outcome: DrawOutcome,
    /// A flip was captured into the duplicate surface
    pub mirrored: bool,
}

/// Routes draw calls to the primary surface.
///
/// Every call is announced as [`Notification::DrawIntercepted`] when a
/// listener is passed; without one the call is not copied. Flips are
/// rewritten when a mirror exists so the presented frame survives in the
/// duplicate buffer for the overlay.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    primary: SurfaceId,
    mirror: Option<Mirror>,
    background: Color,
}

impl Dispatcher {
    pub fn new(primary: SurfaceId, mirror: Option<Mirror>, background: Color) -> Self {
        Self {
            primary,
            mirror,
            background,
        }
    }

    pub fn primary(&self) -> SurfaceId {
        self.primary
    }

    pub fn mirror(&self) -> Option<&Mirror> {
        self.mirror.as_ref()
    }

    pub fn dispatch(
        &self,
        toolkit: &mut dyn Toolkit,
        call: DrawCall,
        notify: Option<&mut dyn FnMut(Notification)>,
    ) -> Result<Dispatched, ToolkitError> {
        trace!("dispatch {}", call.name());

        if call.creates_resource() {
            // Subscribers need the created handle, so execute first.
            return match toolkit.execute(self.primary, &call) {
                Ok(outcome) => {
                    if let Some(notify) = notify {
                        notify(Notification::DrawIntercepted {
                            call,
                            created: outcome.texture(),
                        });
                    }
                    Ok(Dispatched {
                        outcome,
                        mirrored: false,
                    })
                }
                Err(e) => {
                    if let Some(notify) = notify {
                        notify(Notification::DrawIntercepted { call, created: None });
                    }
                    Err(e)
                }
            };
        }

        if let Some(notify) = notify {
            notify(Notification::DrawIntercepted {
                call: call.clone(),
                created: None,
            });
        }

        match (&call, &self.mirror) {
            (DrawCall::Flip(_), Some(mirror)) => {
                let outcome = self.mirrored_flip(toolkit, mirror)?;
                Ok(Dispatched {
                    outcome,
                    mirrored: true,
                })
            }
            _ => Ok(Dispatched {
                outcome: toolkit.execute(self.primary, &call)?,
                mirrored: false,
            }),
        }
    }

    /// Present unsynced without clearing, copy the frame out, then clear the
    /// primary to the background the requested flip would have produced.
    fn mirrored_flip(
        &self,
        toolkit: &mut dyn Toolkit,
        mirror: &Mirror,
    ) -> Result<DrawOutcome, ToolkitError> {
        let outcome = toolkit.execute(
            self.primary,
            &DrawCall::Flip(FlipOptions {
                dont_clear: true,
                dont_sync: true,
            }),
        )?;
        toolkit.copy_region(self.primary, mirror.duplicate, None, None)?;
        toolkit.execute(
            self.primary,
            &DrawCall::Fill {
                color: self.background,
                rect: None,
            },
        )?;
        Ok(outcome)
    }
}
