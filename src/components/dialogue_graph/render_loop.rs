//! Frame-budgeted render scheduler.
//!
//! Each frame runs, in order: every high-priority task queued before the frame
//! started, the render callback (only if a render was requested), then deferred
//! tasks one at a time while the frame budget minus a safety margin allows.
//!
//! Frames come from a [`FrameSource`], so the same loop runs on
//! `requestAnimationFrame` in the browser and on [`ManualFrameSource`] in tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use log::error;

use super::style::LoopConfig;

/// Opaque id of a scheduled frame callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameHandle(pub i64);

/// Callback receiving the frame timestamp in milliseconds.
pub type FrameCallback = Box<dyn FnOnce(f64)>;

/// Supplier of display frames and a monotonic clock.
pub trait FrameSource {
	/// Milliseconds on the same clock as frame timestamps.
	fn now(&self) -> f64;
	/// Schedules `callback` for the next frame. `None` if the platform refused.
	fn request_frame(&self, callback: FrameCallback) -> Option<FrameHandle>;
	fn cancel_frame(&self, handle: FrameHandle);
}

/// Deterministic frame source driven by hand.
#[derive(Default)]
pub struct ManualFrameSource {
	clock: Cell<f64>,
	next_id: Cell<i64>,
	pending: RefCell<Vec<(FrameHandle, FrameCallback)>>,
}

impl ManualFrameSource {
	pub fn new() -> Self {
		Self::default()
	}

	/// Moves the clock without running frames, e.g. to simulate work.
	pub fn advance(&self, ms: f64) {
		self.clock.set(self.clock.get() + ms);
	}

	pub fn pending(&self) -> usize {
		self.pending.borrow().len()
	}

	/// Advances the clock by `frame_ms` and fires every callback scheduled so far.
	/// Callbacks scheduled while firing wait for the next call. Returns how many ran.
	pub fn run_frame(&self, frame_ms: f64) -> usize {
		self.advance(frame_ms);
		let timestamp = self.clock.get();
		let due = std::mem::take(&mut *self.pending.borrow_mut());
		let count = due.len();
		for (_, callback) in due {
			callback(timestamp);
		}
		count
	}
}

impl FrameSource for ManualFrameSource {
	fn now(&self) -> f64 {
		self.clock.get()
	}

	fn request_frame(&self, callback: FrameCallback) -> Option<FrameHandle> {
		let handle = FrameHandle(self.next_id.get());
		self.next_id.set(handle.0 + 1);
		self.pending.borrow_mut().push((handle, callback));
		Some(handle)
	}

	fn cancel_frame(&self, handle: FrameHandle) {
		self.pending.borrow_mut().retain(|(h, _)| *h != handle);
	}
}

/// Rolling timing report, emitted once per stats interval.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RenderStats {
	pub fps: f64,
	/// Mean interval between frames over the history window, in ms.
	pub average_frame_time: f64,
	/// Duration of the most recent render callback, in ms.
	pub last_render_time: f64,
	/// Budget left over at the end of the most recent frame, in ms.
	pub idle_time: f64,
}

pub type RenderCallback = Box<dyn FnMut(f64) -> anyhow::Result<()>>;
type Task = Box<dyn FnOnce()>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Priority {
	/// Runs before the frame's render.
	High,
	/// Runs after the render, only while frame budget remains.
	Deferred,
}

#[derive(Default)]
struct LoopState {
	running: bool,
	handle: Option<FrameHandle>,
	render_requested: bool,
	high_priority: VecDeque<Task>,
	deferred: VecDeque<Task>,
	last_timestamp: Option<f64>,
	frame_times: VecDeque<f64>,
	frames_since_report: u32,
	last_report: Option<f64>,
	last_render_time: f64,
	idle_time: f64,
}

struct Shared {
	source: Rc<dyn FrameSource>,
	config: LoopConfig,
	state: RefCell<LoopState>,
	render: RefCell<Option<RenderCallback>>,
	on_stats: RefCell<Option<Box<dyn FnMut(RenderStats)>>>,
}

impl Drop for Shared {
	fn drop(&mut self) {
		if let Some(handle) = self.state.get_mut().handle.take() {
			self.source.cancel_frame(handle);
		}
	}
}

/// Cheaply clonable handle to one render loop. The loop lives as long as any
/// strong handle; scheduled frames only hold a weak reference.
#[derive(Clone)]
pub struct RenderLoop {
	shared: Rc<Shared>,
}

/// Non-owning handle, for callbacks stored inside what the loop itself owns.
#[derive(Clone)]
pub struct WeakRenderLoop {
	shared: Weak<Shared>,
}

impl WeakRenderLoop {
	pub fn upgrade(&self) -> Option<RenderLoop> {
		self.shared.upgrade().map(|shared| RenderLoop { shared })
	}
}

impl RenderLoop {
	pub fn new(source: Rc<dyn FrameSource>, config: LoopConfig) -> Self {
		Self {
			shared: Rc::new(Shared {
				source,
				config,
				state: RefCell::new(LoopState::default()),
				render: RefCell::new(None),
				on_stats: RefCell::new(None),
			}),
		}
	}

	pub fn downgrade(&self) -> WeakRenderLoop {
		WeakRenderLoop {
			shared: Rc::downgrade(&self.shared),
		}
	}

	pub fn now(&self) -> f64 {
		self.shared.source.now()
	}

	pub fn is_running(&self) -> bool {
		self.shared.state.borrow().running
	}

	/// Starts the per-frame cycle and requests a first render.
	pub fn start(&self, render: impl FnMut(f64) -> anyhow::Result<()> + 'static) {
		*self.shared.render.borrow_mut() = Some(Box::new(render));
		{
			let mut state = self.shared.state.borrow_mut();
			if state.running {
				state.render_requested = true;
				return;
			}
			state.running = true;
			state.render_requested = true;
			state.last_timestamp = None;
		}
		schedule(&self.shared);
	}

	/// Stops the loop and cancels the pending frame so nothing else executes.
	/// The render callback and queued tasks are released.
	pub fn stop(&self) {
		let (handle, queued) = {
			let mut state = self.shared.state.borrow_mut();
			state.running = false;
			state.render_requested = false;
			let queued = (
				std::mem::take(&mut state.high_priority),
				std::mem::take(&mut state.deferred),
			);
			(state.handle.take(), queued)
		};
		if let Some(handle) = handle {
			self.shared.source.cancel_frame(handle);
		}
		drop(queued);
		// Busy only when stopped from inside the render callback itself.
		if let Ok(mut render) = self.shared.render.try_borrow_mut() {
			render.take();
		}
	}

	/// Asks for one render on the next frame; repeated calls coalesce.
	pub fn request_render(&self) {
		self.shared.state.borrow_mut().render_requested = true;
	}

	pub fn render_requested(&self) -> bool {
		self.shared.state.borrow().render_requested
	}

	pub fn schedule(&self, priority: Priority, task: impl FnOnce() + 'static) {
		let mut state = self.shared.state.borrow_mut();
		match priority {
			Priority::High => state.high_priority.push_back(Box::new(task)),
			Priority::Deferred => state.deferred.push_back(Box::new(task)),
		}
	}

	pub fn pending_deferred(&self) -> usize {
		self.shared.state.borrow().deferred.len()
	}

	pub fn set_on_stats(&self, callback: impl FnMut(RenderStats) + 'static) {
		*self.shared.on_stats.borrow_mut() = Some(Box::new(callback));
	}
}

fn schedule(shared: &Rc<Shared>) {
	let weak: Weak<Shared> = Rc::downgrade(shared);
	let handle = shared.source.request_frame(Box::new(move |timestamp| {
		if let Some(shared) = weak.upgrade() {
			run_frame(&shared, timestamp);
		}
	}));
	if handle.is_none() {
		error!("frame source refused to schedule a frame; render loop stalled");
	}
	shared.state.borrow_mut().handle = handle;
}

fn run_frame(shared: &Rc<Shared>, timestamp: f64) {
	let (delta, high_priority) = {
		let mut state = shared.state.borrow_mut();
		if !state.running {
			return;
		}
		state.handle = None;
		let delta = state
			.last_timestamp
			.map_or(shared.config.target_frame_ms, |last| timestamp - last);
		state.last_timestamp = Some(timestamp);
		(delta, std::mem::take(&mut state.high_priority))
	};
	// Queue the next frame first so a failing frame cannot stall the loop.
	schedule(shared);

	let frame_start = shared.source.now();
	for task in high_priority {
		task();
	}

	let render_now = std::mem::take(&mut shared.state.borrow_mut().render_requested);
	if render_now {
		let render_start = shared.source.now();
		if let Some(render) = shared.render.borrow_mut().as_mut()
			&& let Err(err) = render(delta)
		{
			error!("render callback failed: {err:#}");
		}
		shared.state.borrow_mut().last_render_time = shared.source.now() - render_start;
	}

	let budget = shared.config.target_frame_ms;
	let margin = shared.config.safety_margin_ms;
	loop {
		let remaining = budget - (shared.source.now() - frame_start);
		if remaining <= margin {
			break;
		}
		let Some(task) = shared.state.borrow_mut().deferred.pop_front() else {
			break;
		};
		task();
	}
	let idle = (budget - (shared.source.now() - frame_start)).max(0.0);

	let report = {
		let mut state = shared.state.borrow_mut();
		state.idle_time = idle;
		state.frame_times.push_back(delta);
		while state.frame_times.len() > shared.config.history_len.max(1) {
			state.frame_times.pop_front();
		}
		state.frames_since_report += 1;
		let since = *state.last_report.get_or_insert(timestamp);
		let elapsed = timestamp - since;
		if elapsed >= shared.config.stats_interval_ms {
			let average = state.frame_times.iter().sum::<f64>() / state.frame_times.len() as f64;
			let stats = RenderStats {
				fps: f64::from(state.frames_since_report) * 1000.0 / elapsed,
				average_frame_time: average,
				last_render_time: state.last_render_time,
				idle_time: state.idle_time,
			};
			state.frames_since_report = 0;
			state.last_report = Some(timestamp);
			Some(stats)
		} else {
			None
		}
	};
	if let Some(stats) = report
		&& let Some(callback) = shared.on_stats.borrow_mut().as_mut()
	{
		callback(stats);
	}
}
