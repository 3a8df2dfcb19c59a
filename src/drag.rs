//! Drag-to-reorder for tile grids
//!
//! A pure state machine: [`DragState::step`] takes an input event and returns
//! the next state plus the effects a renderer should apply. Nothing here
//! reads the clock, so long-press timing is driven by `Tick` events.
//!
//! Positions are slots in the grid. The machine tracks the current
//! arrangement as a permutation of the original item indices and hands it
//! out with [`DragEffect::Commit`] when the pointer is released.

use std::ops::Range;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    fn distance(self, other: Point) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

/// Geometry of a grid with `count` tiles laid out row by row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLayout {
    pub columns: usize,
    pub cell: Size,
    pub gap: f32,
    pub count: usize,
}

impl GridLayout {
    pub fn new(columns: usize, cell: Size, gap: f32, count: usize) -> Self {
        Self {
            columns: columns.max(1),
            cell,
            gap,
            count,
        }
    }

    /// Slot under `point`, clamped into the grid
    pub fn index_at(&self, point: Point) -> usize {
        let last = self.count.saturating_sub(1);
        let columns = self.columns.max(1);
        let column = slot(point.x, self.cell.width + self.gap).min(columns - 1);
        let row = slot(point.y, self.cell.height + self.gap);
        row.saturating_mul(columns)
            .saturating_add(column)
            .min(last)
    }

    /// Top-left corner of a slot
    pub fn origin(&self, index: usize) -> Point {
        let columns = self.columns.max(1);
        let (row, column) = (index / columns, index % columns);
        Point::new(
            column as f32 * (self.cell.width + self.gap),
            row as f32 * (self.cell.height + self.gap),
        )
    }
}

fn slot(offset: f32, pitch: f32) -> usize {
    if offset <= 0.0 || pitch <= 0.0 {
        0
    } else {
        (offset / pitch) as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Top,
    Bottom,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragConfig {
    pub layout: GridLayout,
    /// Hold time before a press turns into a drag
    pub long_press: Duration,
    /// Movement that turns a pending press into a scroll
    pub move_tolerance: f32,
    pub viewport: Size,
    /// Distance from the viewport border that counts as edge hover
    pub edge_margin: f32,
}

impl DragConfig {
    pub fn new(layout: GridLayout, viewport: Size) -> Self {
        Self {
            layout,
            long_press: Duration::from_millis(500),
            move_tolerance: 8.0,
            viewport,
            edge_margin: 40.0,
        }
    }

    fn edge_at(&self, point: Point) -> Option<Edge> {
        let margin = self.edge_margin;
        if point.y < margin {
            Some(Edge::Top)
        } else if point.y > self.viewport.height - margin {
            Some(Edge::Bottom)
        } else if point.x < margin {
            Some(Edge::Left)
        } else if point.x > self.viewport.width - margin {
            Some(Edge::Right)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DragEvent {
    /// `selected` holds the slots of a multi-selection, if any
    PointerDown {
        index: usize,
        point: Point,
        at: Instant,
        selected: Vec<usize>,
    },
    PointerMove {
        point: Point,
        at: Instant,
    },
    Tick {
        at: Instant,
    },
    /// Start dragging without waiting for the long press
    Start,
    PointerUp,
    Cancel,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DragEffect {
    ArmLongPress(Instant),
    /// Original indices of the dragged items
    DragStarted(Vec<usize>),
    Moved { from: usize, to: usize },
    EdgeHover(Option<Edge>),
    /// Final arrangement as original indices in display order
    Commit(Vec<usize>),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Pending {
        index: usize,
        origin: Point,
        deadline: Instant,
        selected: Vec<usize>,
    },
    Dragging {
        /// Original indices in current display order
        order: Vec<usize>,
        /// Slots occupied by the dragged block
        block: Range<usize>,
        /// Position of the pressed item inside the block
        offset: usize,
        /// Top-left corner of the slot under the pressed item
        anchor: Point,
        edge: Option<Edge>,
    },
}

impl DragState {
    pub fn step(self, event: DragEvent, config: &DragConfig) -> (DragState, Vec<DragEffect>) {
        match (self, event) {
            (
                DragState::Idle,
                DragEvent::PointerDown {
                    index,
                    point,
                    at,
                    selected,
                },
            ) if index < config.layout.count => {
                let deadline = at + config.long_press;
                (
                    DragState::Pending {
                        index,
                        origin: point,
                        deadline,
                        selected,
                    },
                    vec![DragEffect::ArmLongPress(deadline)],
                )
            }

            (
                DragState::Pending {
                    index,
                    origin,
                    deadline,
                    selected,
                },
                DragEvent::PointerMove { point, at },
            ) => {
                if point.distance(origin) > config.move_tolerance {
                    // moved away before the long press: treat as a scroll
                    return (DragState::Idle, Vec::new());
                }
                let pending = DragState::Pending {
                    index,
                    origin,
                    deadline,
                    selected,
                };
                if at >= deadline {
                    pending.begin(config)
                } else {
                    (pending, Vec::new())
                }
            }

            (pending @ DragState::Pending { .. }, DragEvent::Tick { at }) => {
                if pending.deadline().is_some_and(|deadline| at >= deadline) {
                    pending.begin(config)
                } else {
                    (pending, Vec::new())
                }
            }

            (pending @ DragState::Pending { .. }, DragEvent::Start) => pending.begin(config),

            (DragState::Pending { .. }, DragEvent::PointerUp | DragEvent::Cancel) => {
                (DragState::Idle, Vec::new())
            }

            (
                DragState::Dragging {
                    mut order,
                    block,
                    offset,
                    anchor,
                    edge,
                },
                DragEvent::PointerMove { point, .. },
            ) => {
                let mut effects = Vec::new();

                let hover = config.edge_at(point);
                if hover != edge {
                    effects.push(DragEffect::EdgeHover(hover));
                }

                let target = config.layout.index_at(point);
                let (block, anchor) = if block.contains(&target) {
                    (block, anchor)
                } else {
                    let len = block.len();
                    let to = target.min(order.len() - len);
                    move_block(&mut order, block.start, len, to);
                    effects.push(DragEffect::Moved {
                        from: block.start,
                        to,
                    });
                    (to..to + len, config.layout.origin(to + offset))
                };

                (
                    DragState::Dragging {
                        order,
                        block,
                        offset,
                        anchor,
                        edge: hover,
                    },
                    effects,
                )
            }

            (DragState::Dragging { order, edge, .. }, DragEvent::PointerUp) => {
                let mut effects = Vec::new();
                if edge.is_some() {
                    effects.push(DragEffect::EdgeHover(None));
                }
                effects.push(DragEffect::Commit(order));
                (DragState::Idle, effects)
            }

            (DragState::Dragging { edge, .. }, DragEvent::Cancel) => {
                let mut effects = Vec::new();
                if edge.is_some() {
                    effects.push(DragEffect::EdgeHover(None));
                }
                effects.push(DragEffect::Cancelled);
                (DragState::Idle, effects)
            }

            (state, _) => (state, Vec::new()),
        }
    }

    /// Turn a pending press into a drag
    fn begin(self, config: &DragConfig) -> (DragState, Vec<DragEffect>) {
        let DragState::Pending {
            index, selected, ..
        } = self
        else {
            return (self, Vec::new());
        };

        let count = config.layout.count;
        if index >= count {
            return (DragState::Idle, vec![DragEffect::Cancelled]);
        }
        let mut order: Vec<usize> = (0..count).collect();

        let mut group: Vec<usize> = selected.into_iter().filter(|&i| i < count).collect();
        group.sort_unstable();
        group.dedup();
        if !group.contains(&index) {
            group = vec![index];
        }

        // gather the selection into one run starting at its first slot
        let start = group[0];
        order.retain(|i| !group.contains(i));
        let tail = order.split_off(start);
        order.extend_from_slice(&group);
        order.extend(tail);

        if group.len() > 1 {
            log::debug!("Dragging {} items from slot {start}", group.len());
        }

        let offset = group.iter().position(|&i| i == index).unwrap_or(0);
        (
            DragState::Dragging {
                order,
                block: start..start + group.len(),
                offset,
                anchor: config.layout.origin(start + offset),
                edge: None,
            },
            vec![DragEffect::DragStarted(group)],
        )
    }

    fn deadline(&self) -> Option<Instant> {
        match self {
            DragState::Pending { deadline, .. } => Some(*deadline),
            _ => None,
        }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self, DragState::Dragging { .. })
    }
}

/// Move `len` items starting at `from` so the run starts at `to`
pub fn move_block<T>(items: &mut Vec<T>, from: usize, len: usize, to: usize) {
    if len == 0 || from + len > items.len() || from == to {
        return;
    }
    let block: Vec<T> = items.drain(from..from + len).collect();
    let to = to.min(items.len());
    let tail = items.split_off(to);
    items.extend(block);
    items.extend(tail);
}
