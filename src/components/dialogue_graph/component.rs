use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use leptos::prelude::*;
use log::{error, info};
use wasm_bindgen::prelude::*;
use web_sys::{HtmlCanvasElement, KeyboardEvent, MouseEvent, WheelEvent, Window};

use super::error::RenderError;
use super::render_loop::{FrameSource, Priority, RenderLoop, RenderStats, WeakRenderLoop};
use super::state::{CanvasState, Response};
use super::style::RenderConfig;
use super::surface::{PictureSurfaceFactory, SurfaceFactory};
use super::types::{DialogueGraph, Position};
use super::web::{RafFrameSource, WebCanvas, detect_surface_factory};

const FALLBACK_SIZE: (f64, f64) = (800.0, 600.0);

type SharedHost = Rc<RefCell<Option<Host>>>;

/// Everything that lives for as long as the canvas is mounted.
struct Host {
	canvas: WebCanvas,
	state: CanvasState,
	fullscreen: bool,
	_resize: Option<ResizeListener>,
}

impl Host {
	fn fit_to_element(&mut self) {
		let (width, height, dpr) = measure(self.canvas.element(), self.fullscreen);
		self.canvas.resize(width, height, dpr);
		self.state.renderer_mut().resize(width, height, dpr);
	}
}

/// Window `resize` listener, removed again when dropped.
struct ResizeListener {
	window: Window,
	callback: Closure<dyn FnMut()>,
}

impl Drop for ResizeListener {
	fn drop(&mut self) {
		let _ = self
			.window
			.remove_event_listener_with_callback("resize", self.callback.as_ref().unchecked_ref());
	}
}

fn listen_for_resize(host: Weak<RefCell<Option<Host>>>, render_loop: WeakRenderLoop) -> Option<ResizeListener> {
	let window = web_sys::window()?;
	let callback = Closure::<dyn FnMut()>::new(move || {
		let Some(host) = host.upgrade() else {
			return;
		};
		if let Some(ref mut h) = *host.borrow_mut() {
			h.fit_to_element();
		}
		if let Some(render_loop) = render_loop.upgrade() {
			render_loop.request_render();
		}
	});
	window
		.add_event_listener_with_callback("resize", callback.as_ref().unchecked_ref())
		.ok()?;
	Some(ResizeListener { window, callback })
}

/// CSS size of the canvas and the device pixel ratio.
fn measure(canvas: &HtmlCanvasElement, fullscreen: bool) -> (f64, f64, f64) {
	let window = web_sys::window();
	let dpr = window.as_ref().map_or(1.0, Window::device_pixel_ratio);
	let dpr = if dpr.is_finite() && dpr > 0.0 { dpr } else { 1.0 };
	let (width, height) = if fullscreen {
		let px = |v: Result<JsValue, JsValue>| v.ok().and_then(|v| v.as_f64());
		window
			.as_ref()
			.and_then(|w| Some((px(w.inner_width())?, px(w.inner_height())?)))
			.unwrap_or(FALLBACK_SIZE)
	} else {
		canvas
			.parent_element()
			.map(|p| (f64::from(p.client_width()), f64::from(p.client_height())))
			.filter(|(w, h)| *w > 0.0 && *h > 0.0)
			.unwrap_or(FALLBACK_SIZE)
	};
	(width, height, dpr)
}

fn mount(
	element: HtmlCanvasElement,
	config: RenderConfig,
	fullscreen: bool,
	graph: DialogueGraph,
	host: &SharedHost,
) -> Result<RenderLoop, RenderError> {
	let canvas = WebCanvas::new(element)?;
	let source: Rc<dyn FrameSource> = Rc::new(RafFrameSource::new()?);
	let render_loop = RenderLoop::new(source, config.render_loop.clone());

	let mut config = config;
	let factory: Box<dyn SurfaceFactory> = match detect_surface_factory() {
		Some(factory) => factory,
		None => {
			config.cache.enabled = false;
			Box::new(PictureSurfaceFactory)
		}
	};
	let mut state = CanvasState::new(config, factory, graph);
	let on_change = render_loop.downgrade();
	state.renderer_mut().viewport_mut().set_on_change(move || {
		if let Some(render_loop) = on_change.upgrade() {
			render_loop.request_render();
		}
	});

	let mut mounted = Host {
		canvas,
		state,
		fullscreen,
		_resize: None,
	};
	mounted.fit_to_element();
	mounted.state.fit_to_content();
	let viewport = mounted.state.renderer().viewport();
	info!(
		"dialogue canvas mounted: {}x{} css px, dpr {}, {} nodes",
		viewport.width(),
		viewport.height(),
		viewport.device_pixel_ratio(),
		mounted.state.graph().nodes.len()
	);
	mounted._resize = listen_for_resize(Rc::downgrade(host), render_loop.downgrade());
	*host.borrow_mut() = Some(mounted);

	let host_render = host.clone();
	render_loop.start(move |_delta| {
		if let Some(ref mut h) = *host_render.borrow_mut() {
			let Host { canvas, state, .. } = h;
			state.render(canvas.context());
		}
		Ok(())
	});
	Ok(render_loop)
}

/// Steps viewport animation or inertia once per frame until it settles.
fn schedule_motion_step(render_loop: WeakRenderLoop, host: SharedHost, driving: Rc<Cell<bool>>) {
	let Some(current) = render_loop.upgrade() else {
		driving.set(false);
		return;
	};
	current.schedule(Priority::High, move || {
		let Some(now) = render_loop.upgrade().map(|l| l.now()) else {
			driving.set(false);
			return;
		};
		let moving = host
			.borrow_mut()
			.as_mut()
			.is_some_and(|h| h.state.renderer_mut().viewport_mut().advance(now));
		if moving {
			schedule_motion_step(render_loop, host, driving);
		} else {
			driving.set(false);
		}
	});
}

/// Shared handles captured by the event handlers.
#[derive(Clone)]
struct Handles {
	host: SharedHost,
	render_loop: Rc<RefCell<Option<RenderLoop>>>,
	driving: Rc<Cell<bool>>,
	hover_at: Rc<Cell<Option<Position>>>,
}

impl Handles {
	fn new() -> Self {
		Self {
			host: Rc::new(RefCell::new(None)),
			render_loop: Rc::new(RefCell::new(None)),
			driving: Rc::new(Cell::new(false)),
			hover_at: Rc::new(Cell::new(None)),
		}
	}

	/// Runs one input event against the state and follows up on its [`Response`].
	fn dispatch(&self, event: impl FnOnce(&mut CanvasState, f64) -> Response) -> Option<Response> {
		let render_loop = self.render_loop.borrow().clone()?;
		let now = render_loop.now();
		let response = {
			let mut guard = self.host.borrow_mut();
			event(&mut guard.as_mut()?.state, now)
		};
		if response.redraw {
			render_loop.request_render();
		}
		if response.motion && !self.driving.replace(true) {
			schedule_motion_step(render_loop.downgrade(), self.host.clone(), self.driving.clone());
		}
		Some(response)
	}

	/// Stops the loop and releases the mounted canvas state.
	fn shutdown(&self) {
		self.hover_at.set(None);
		if let Some(render_loop) = self.render_loop.borrow_mut().take() {
			render_loop.stop();
		}
		self.host.borrow_mut().take();
	}

	/// Hover hit-testing is postponed to spare frame time; only the latest
	/// pointer position is tested.
	fn queue_hover(&self, point: Position) {
		if self.hover_at.replace(Some(point)).is_some() {
			return;
		}
		let Some(render_loop) = self.render_loop.borrow().clone() else {
			return;
		};
		let (host, hover_at, weak) = (self.host.clone(), self.hover_at.clone(), render_loop.downgrade());
		render_loop.schedule(Priority::Deferred, move || {
			let Some(point) = hover_at.take() else {
				return;
			};
			let changed = host
				.borrow_mut()
				.as_mut()
				.is_some_and(|h| h.state.hover_at(point));
			if changed && let Some(render_loop) = weak.upgrade() {
				render_loop.request_render();
			}
		});
	}
}

fn pointer_position(canvas_ref: NodeRef<leptos::html::Canvas>, ev: &MouseEvent) -> Option<Position> {
	let canvas: HtmlCanvasElement = canvas_ref.get()?.into();
	let rect = canvas.get_bounding_client_rect();
	Some(Position::new(
		f64::from(ev.client_x()) - rect.left(),
		f64::from(ev.client_y()) - rect.top(),
	))
}

/// Interactive canvas for a dialogue graph snapshot.
///
/// The component keeps its own copy of the graph: node drags and new
/// connections edit that copy, and a new `graph` value replaces it.
#[component]
pub fn DialogueGraphCanvas(
	#[prop(into)] graph: Signal<DialogueGraph>,
	#[prop(optional)] config: Option<RenderConfig>,
	#[prop(default = false)] fullscreen: bool,
	/// Receives render loop statistics once per stats interval.
	#[prop(optional)]
	stats: Option<WriteSignal<RenderStats>>,
) -> impl IntoView {
	let canvas_ref = NodeRef::<leptos::html::Canvas>::new();
	let handles = Handles::new();

	let init = handles.clone();
	Effect::new(move |_| {
		let Some(canvas) = canvas_ref.get() else {
			return;
		};
		if init.render_loop.borrow().is_some() {
			return;
		}
		let config = config.clone().unwrap_or_default();
		match mount(canvas.into(), config, fullscreen, graph.get_untracked(), &init.host) {
			Ok(render_loop) => {
				if let Some(stats) = stats {
					render_loop.set_on_stats(move |s| {
						let _ = stats.try_set(s);
					});
				}
				*init.render_loop.borrow_mut() = Some(render_loop);
			}
			Err(err) => error!("dialogue canvas unavailable: {err}"),
		}
	});

	// The handles are `Rc`-based, so cleanup reaches them through local storage.
	let teardown = StoredValue::new_local(handles.clone());
	on_cleanup(move || {
		teardown.try_with_value(Handles::shutdown);
	});

	let sync = handles.clone();
	Effect::new(move |_| {
		let snapshot = graph.get();
		if let Some(ref mut h) = *sync.host.borrow_mut() {
			h.state.set_graph(snapshot);
		}
		if let Some(render_loop) = sync.render_loop.borrow().as_ref() {
			render_loop.request_render();
		}
	});

	let h = handles.clone();
	let on_mousedown = move |ev: MouseEvent| {
		let Some(point) = pointer_position(canvas_ref, &ev) else {
			return;
		};
		let shift = ev.shift_key();
		h.dispatch(|s, _| s.pointer_down(point, shift));
	};

	let h = handles.clone();
	let on_mousemove = move |ev: MouseEvent| {
		let Some(point) = pointer_position(canvas_ref, &ev) else {
			return;
		};
		if h.dispatch(|s, now| s.pointer_move(point, now))
			.is_some_and(|r| r.hover)
		{
			h.queue_hover(point);
		}
	};

	let h = handles.clone();
	let on_mouseup = move |_: MouseEvent| {
		h.dispatch(|s, now| s.pointer_up(now));
	};

	let h = handles.clone();
	let on_mouseleave = move |_: MouseEvent| {
		h.hover_at.set(None);
		h.dispatch(|s, _| s.pointer_leave());
	};

	let h = handles.clone();
	let on_wheel = move |ev: WheelEvent| {
		ev.prevent_default();
		let Some(point) = pointer_position(canvas_ref, &ev) else {
			return;
		};
		let delta = ev.delta_y();
		h.dispatch(|s, _| s.wheel(delta, point));
	};

	let h = handles.clone();
	let on_dblclick = move |_: MouseEvent| {
		h.dispatch(|s, now| s.double_click(now));
	};

	let h = handles;
	let on_keydown = move |ev: KeyboardEvent| {
		let key = ev.key();
		if h.dispatch(|s, now| s.key(&key, now))
			.is_some_and(|r| r != Response::default())
		{
			ev.prevent_default();
		}
	};

	view! {
		<canvas
			node_ref=canvas_ref
			class="dialogue-graph-canvas"
			tabindex="0"
			on:mousedown=on_mousedown
			on:mousemove=on_mousemove
			on:mouseup=on_mouseup
			on:mouseleave=on_mouseleave
			on:wheel=on_wheel
			on:dblclick=on_dblclick
			on:keydown=on_keydown
			style="display: block; cursor: grab; outline: none;"
		/>
	}
}
