//! In-memory toolkit backend
//!
//! Records every operation into a shared [`Journal`] instead of touching a GPU.
//! Used by the demo binary and by tests, which can also script the answers of
//! asynchronous flip polls and make chosen primitives fail.

use super::toolkit::{DrawCall, DrawOutcome, SurfaceId, TextureId, Toolkit, ToolkitError};
use crate::geometry::Rect;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use std::time::Instant;

/// One recorded toolkit operation
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Open { screen: Option<usize>, size: (u32, u32) },
    Draw(DrawCall),
    /// Copy into the journal entry's surface
    Copy {
        from: SurfaceId,
        src_rect: Option<Rect>,
        dst_rect: Option<Rect>,
    },
    AsyncFlipBegin,
    AsyncFlipCheck { done: bool },
    Close,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    pub surface: SurfaceId,
    pub op: Operation,
}

/// Shared, cloneable view of everything a [`HeadlessToolkit`] did
#[derive(Debug, Clone, Default)]
pub struct Journal(Rc<RefCell<Vec<JournalEntry>>>);

impl Journal {
    fn record(&self, surface: SurfaceId, op: Operation) {
        self.0.borrow_mut().push(JournalEntry { surface, op });
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        self.0.borrow().clone()
    }

    /// Operations recorded against one surface, in order
    pub fn for_surface(&self, surface: SurfaceId) -> Vec<Operation> {
        self.0
            .borrow()
            .iter()
            .filter(|e| e.surface == surface)
            .map(|e| e.op.clone())
            .collect()
    }

    /// Count entries matching a predicate
    pub fn count(&self, pred: impl Fn(&JournalEntry) -> bool) -> usize {
        self.0.borrow().iter().filter(|e| pred(e)).count()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

/// Scripted answer for an asynchronous flip poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipCheck {
    Pending,
    Done,
    Fail,
}

#[derive(Debug)]
struct HeadlessSurface {
    size: (u32, u32),
    flipping: bool,
}

/// Toolkit that keeps surfaces in memory and journals every call
#[derive(Debug)]
pub struct HeadlessToolkit {
    screens: Vec<(u32, u32)>,
    surfaces: HashMap<SurfaceId, HeadlessSurface>,
    textures: HashSet<TextureId>,
    next_surface: u32,
    next_texture: u32,
    flip_checks: VecDeque<FlipCheck>,
    failing: HashSet<&'static str>,
    journal: Journal,
}

impl HeadlessToolkit {
    /// Create a toolkit whose screen `i` has size `screens[i]`
    pub fn new(screens: Vec<(u32, u32)>) -> Self {
        Self {
            screens,
            surfaces: HashMap::new(),
            textures: HashSet::new(),
            next_surface: 1,
            next_texture: 1,
            flip_checks: VecDeque::new(),
            failing: HashSet::new(),
            journal: Journal::default(),
        }
    }

    /// Two identical screens, the usual subject + operator setup
    pub fn dual(width: u32, height: u32) -> Self {
        Self::new(vec![(width, height), (width, height)])
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    /// Queue answers for upcoming async flip polls; once drained, polls report done
    pub fn script_flip_checks(mut self, checks: impl IntoIterator<Item = FlipCheck>) -> Self {
        self.flip_checks.extend(checks);
        self
    }

    /// Make every draw call with this primitive name fail
    pub fn failing_on(mut self, primitive: &'static str) -> Self {
        self.failing.insert(primitive);
        self
    }

    fn surface_mut(&mut self, id: SurfaceId) -> Result<&mut HeadlessSurface, ToolkitError> {
        self.surfaces
            .get_mut(&id)
            .ok_or(ToolkitError::UnknownSurface(id))
    }

    fn open(&mut self, screen: Option<usize>, size: (u32, u32)) -> SurfaceId {
        let id = SurfaceId(self.next_surface);
        self.next_surface += 1;
        self.surfaces.insert(id, HeadlessSurface { size, flipping: false });
        self.journal.record(id, Operation::Open { screen, size });
        id
    }
}

impl Toolkit for HeadlessToolkit {
    fn open_window(&mut self, screen: usize) -> Result<SurfaceId, ToolkitError> {
        let size = *self
            .screens
            .get(screen)
            .ok_or_else(|| ToolkitError::Backend(format!("no screen {}", screen)))?;
        Ok(self.open(Some(screen), size))
    }

    fn open_offscreen(&mut self, width: u32, height: u32) -> Result<SurfaceId, ToolkitError> {
        Ok(self.open(None, (width, height)))
    }

    fn surface_size(&self, surface: SurfaceId) -> Result<(u32, u32), ToolkitError> {
        self.surfaces
            .get(&surface)
            .map(|s| s.size)
            .ok_or(ToolkitError::UnknownSurface(surface))
    }

    fn execute(&mut self, surface: SurfaceId, call: &DrawCall) -> Result<DrawOutcome, ToolkitError> {
        self.surface_mut(surface)?;
        if self.failing.contains(call.name()) {
            return Err(ToolkitError::Backend(format!("{} failed", call.name())));
        }

        let outcome = match call {
            DrawCall::MakeTexture { width, height, pixels } => {
                if pixels.len() != (*width as usize) * (*height as usize) * 4 {
                    return Err(ToolkitError::Backend(format!(
                        "texture {}x{} needs {} bytes, got {}",
                        width,
                        height,
                        width * height * 4,
                        pixels.len()
                    )));
                }
                let id = TextureId(self.next_texture);
                self.next_texture += 1;
                self.textures.insert(id);
                DrawOutcome::Texture(id)
            }
            DrawCall::DrawTexture { texture, .. } if !self.textures.contains(texture) => {
                return Err(ToolkitError::UnknownTexture(*texture));
            }
            DrawCall::Flip(_) => DrawOutcome::Flipped { at: Instant::now() },
            _ => DrawOutcome::Done,
        };

        self.journal.record(surface, Operation::Draw(call.clone()));
        Ok(outcome)
    }

    fn copy_region(
        &mut self,
        from: SurfaceId,
        to: SurfaceId,
        src_rect: Option<Rect>,
        dst_rect: Option<Rect>,
    ) -> Result<(), ToolkitError> {
        self.surface_mut(from)?;
        self.surface_mut(to)?;
        self.journal.record(
            to,
            Operation::Copy {
                from,
                src_rect,
                dst_rect,
            },
        );
        Ok(())
    }

    fn begin_async_flip(&mut self, surface: SurfaceId) -> Result<(), ToolkitError> {
        let s = self.surface_mut(surface)?;
        if s.flipping {
            return Err(ToolkitError::Backend("async flip already pending".into()));
        }
        s.flipping = true;
        self.journal.record(surface, Operation::AsyncFlipBegin);
        Ok(())
    }

    fn async_flip_done(&mut self, surface: SurfaceId) -> Result<bool, ToolkitError> {
        self.surface_mut(surface)?;
        let answer = self.flip_checks.pop_front().unwrap_or(FlipCheck::Done);
        match answer {
            FlipCheck::Fail => {
                self.surface_mut(surface)?.flipping = false;
                self.journal.record(surface, Operation::AsyncFlipCheck { done: false });
                Err(ToolkitError::Backend("flip status query failed".into()))
            }
            FlipCheck::Pending => {
                self.journal.record(surface, Operation::AsyncFlipCheck { done: false });
                Ok(false)
            }
            FlipCheck::Done => {
                self.surface_mut(surface)?.flipping = false;
                self.journal.record(surface, Operation::AsyncFlipCheck { done: true });
                Ok(true)
            }
        }
    }

    fn close(&mut self, surface: SurfaceId) -> Result<(), ToolkitError> {
        let s = self.surface_mut(surface)?;
        if s.flipping {
            return Err(ToolkitError::Backend("surface closed during async flip".into()));
        }
        self.surfaces.remove(&surface);
        self.journal.record(surface, Operation::Close);
        Ok(())
    }
}
