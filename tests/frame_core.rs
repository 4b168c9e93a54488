use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use vermilion_frame::backend::null::{NullFactory, NullQueue, NullTexture};
use vermilion_frame::backend::WAIT_FOREVER;
use vermilion_frame::{
    Extent2d, GpuResource, GraphSize, JobScheduler, PassConfiguration, PassContext, PassKind,
    RenderGraphBuilder, RenderGraphContext, RenderPass, RenderTextureDescription,
    ResourceLifetimeManager, ResourceState, ResourceStateTracker, SizePolicy, SyncQueue,
    TextureFormat, TextureUsage,
};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ---------------------------------------------------------------------------
// Shared test pass
// ---------------------------------------------------------------------------

struct ChainPass {
    name: String,
    dependencies: Vec<PassKind>,
    rendered: Arc<Mutex<Vec<String>>>,
}

impl ChainPass {
    fn new(name: &str, dependencies: Vec<PassKind>, rendered: &Arc<Mutex<Vec<String>>>) -> Box<Self> {
        Box::new(Self {
            name: name.to_string(),
            dependencies,
            rendered: rendered.clone(),
        })
    }
}

impl RenderPass for ChainPass {
    fn name(&self) -> &str {
        &self.name
    }

    fn configuration(&self, _settings: &dyn Any) -> PassConfiguration {
        PassConfiguration {
            dependencies: self.dependencies.clone(),
            working: vec![],
            outputs: vec![RenderTextureDescription::new(
                format!("{}_out", self.name),
                TextureFormat::Rgba16Float,
                SizePolicy::Render { shift: 0 },
                TextureUsage::RENDER_TARGET,
            )],
            async_compute: false,
        }
    }

    fn render(&mut self, ctx: &mut PassContext<'_>) {
        // Every non-final pass must see its own output bound; parameters
        // resolve through the shared context.
        let _ = ctx.entry();
        self.rendered.lock().push(self.name.clone());
    }
}

const A: PassKind = PassKind(0);
const B: PassKind = PassKind(1);
const C: PassKind = PassKind(2);

fn swapchain_target() -> Arc<GpuResource> {
    Arc::new(GpuResource::new_with_object(
        "swapchain",
        Box::new(NullTexture::for_tests()),
    ))
}

// ---------------------------------------------------------------------------
// Full frame round trip: build → allocate → barrier → submit → run
// ---------------------------------------------------------------------------

#[test]
fn full_frame_round_trip() {
    init_logs();
    let rendered = Arc::new(Mutex::new(Vec::new()));
    let mut builder = RenderGraphBuilder::new(Box::new(()));
    builder
        .add_pass(A, ChainPass::new("gbuffer", vec![], &rendered))
        .add_pass(B, ChainPass::new("lighting", vec![A], &rendered))
        .add_pass(C, ChainPass::new("tonemap", vec![B], &rendered))
        .add_link(A, 0, B, 0)
        .add_link(B, 0, C, 0)
        .set_final_pass(C, 0);

    let factory = Arc::new(NullFactory::new());
    let mut context = RenderGraphContext::new(factory);
    context.add_graph_size(0, GraphSize::uniform(Extent2d::new(1920, 1080)));
    let mut graph = builder.build(&mut context, 0).unwrap();
    context.create_graph_resources().unwrap();

    // Flow order is leaf first; the consumer's parameter is the producer's
    // output; the final pass's designated slot stays unassigned.
    let kinds: Vec<_> = graph.nodes().iter().map(|node| node.kind).collect();
    assert_eq!(kinds, vec![A, B, C]);
    assert_eq!(graph.nodes()[1].params[0], graph.nodes()[0].outputs[0]);
    assert!(graph.nodes()[1].params[0].is_some());
    assert_eq!(graph.nodes()[2].outputs[0], None);

    // Transition the intermediate targets and submit the batch on a queue.
    let backend = Arc::new(NullQueue::immediate());
    let queue = SyncQueue::new("graphics", backend.clone());
    let tracker = ResourceStateTracker::new();
    let a_out = context.texture(graph.nodes()[0].outputs[0].unwrap()).unwrap();
    tracker.transition_resource(&a_out, ResourceState::RenderTarget);
    tracker.transition_resource(&a_out, ResourceState::ShaderResource);

    let mut list = queue.get_command_list();
    tracker.flush_pending_transitions(list.as_mut());
    let fence_value = queue.execute_command_lists(vec![list]).unwrap();
    assert!(queue.is_fence_reached(fence_value));
    assert!(queue.cpu_wait_for_fence_value(fence_value, WAIT_FOREVER));
    assert_eq!(backend.barrier_batches().len(), 1);

    graph.submit_entry(A, Box::new(0u32));
    graph.submit_entry(B, Box::new(0u32));
    graph.submit_entry(C, Box::new(0u32));
    graph.run(&context, &swapchain_target());
    assert_eq!(*rendered.lock(), vec!["gbuffer", "lighting", "tonemap"]);
}

// ---------------------------------------------------------------------------
// Aliasing safety
// ---------------------------------------------------------------------------

fn color_desc(name: &str) -> RenderTextureDescription {
    RenderTextureDescription::new(
        name,
        TextureFormat::Rgba16Float,
        SizePolicy::Render { shift: 0 },
        TextureUsage::RENDER_TARGET,
    )
}

#[test]
fn resources_of_one_graph_never_share_backing() {
    init_logs();
    let factory = Arc::new(NullFactory::new());
    let mut context = RenderGraphContext::new(factory);
    let size = GraphSize::uniform(Extent2d::new(1024, 1024));
    context.add_graph_size(0, size);

    let ids: Vec<_> = (0..4)
        .map(|i| {
            context
                .schedule_new_resource(0, color_desc(&format!("rt{i}")))
                .unwrap()
        })
        .collect();
    context.create_graph_resources().unwrap();

    let textures: Vec<_> = ids
        .iter()
        .map(|id| context.texture(*id).unwrap().id())
        .collect();
    for (i, a) in textures.iter().enumerate() {
        for b in &textures[i + 1..] {
            assert_ne!(a, b, "same-graph requests must not alias");
        }
    }
}

#[test]
fn compatible_requests_across_graphs_share_backing() {
    init_logs();
    let factory = Arc::new(NullFactory::new());
    let mut context = RenderGraphContext::new(factory.clone());
    let size = GraphSize::uniform(Extent2d::new(1024, 1024));
    for graph in 0..4 {
        context.add_graph_size(graph, size);
        context.schedule_new_resource(graph, color_desc("color")).unwrap();
    }
    context.create_graph_resources().unwrap();

    // Four compatible requests from four graphs fold into one allocation.
    assert_eq!(context.group_count(), 1);
    assert_eq!(factory.created_count(), 1);
}

// ---------------------------------------------------------------------------
// Fence monotonicity and retirement safety
// ---------------------------------------------------------------------------

#[test]
fn fence_values_increase_by_exactly_one() {
    init_logs();
    let queue = SyncQueue::new("graphics", Arc::new(NullQueue::immediate()));
    let mut previous = 0;
    for _ in 0..100 {
        let value = queue.signal_fence();
        assert_eq!(value, previous + 1);
        previous = value;
    }
}

#[test]
fn resources_survive_until_their_fence_is_reached() {
    init_logs();
    let backend = Arc::new(NullQueue::manual());
    let queue = SyncQueue::new("graphics", backend.clone());
    let manager = ResourceLifetimeManager::new(Arc::new(NullFactory::new()));

    let resource = Arc::new(GpuResource::new_pending("shadow_map"));
    manager.schedule_create_texture_resource(
        &resource,
        TextureFormat::Depth32Float,
        Extent2d::new(2048, 2048),
        TextureUsage::RENDER_TARGET,
    );
    manager.wait_until_resource_valid(&resource);
    assert!(resource.is_valid());

    manager.mark_used(&resource, &queue);
    let list = queue.get_command_list();
    let fence_value = queue.execute_command_lists(vec![list]).unwrap();
    manager.on_command_lists_executed(&queue, fence_value);

    // The device has not confirmed completion: the batch must be retained.
    manager.update_bookkeeping();
    assert_eq!(manager.in_flight_count(), 1);

    backend.complete_to(fence_value);
    manager.update_bookkeeping();
    assert_eq!(manager.in_flight_count(), 0);
}

// ---------------------------------------------------------------------------
// Job scheduler scenarios
// ---------------------------------------------------------------------------

struct OrderedJob {
    value: u32,
    delay: Duration,
    counter: Arc<Mutex<u32>>,
    violations: Arc<Mutex<Vec<(u32, u32)>>>,
}

#[test]
fn prioritization_produces_deterministic_completion_order() {
    init_logs();
    let scheduler = JobScheduler::new("test-priority");
    let counter = Arc::new(Mutex::new(0u32));
    let violations: Arc<Mutex<Vec<(u32, u32)>>> = Arc::new(Mutex::new(Vec::new()));

    let ordered = scheduler.add_job_type(
        |payload| {
            let job = payload.downcast::<OrderedJob>().unwrap();
            std::thread::sleep(job.delay);
            let mut counter = job.counter.lock();
            if *counter != job.value - 1 {
                job.violations.lock().push((job.value - 1, *counter));
            }
            *counter = job.value;
        },
        false,
    );

    let schedule = |value: u32, delay_ms: u64| {
        scheduler
            .schedule_job(
                ordered,
                Box::new(OrderedJob {
                    value,
                    delay: Duration::from_millis(delay_ms),
                    counter: counter.clone(),
                    violations: violations.clone(),
                }),
            )
            .unwrap()
    };

    // The first job holds the worker long enough for the rest to be queued
    // and reordered; give it a moment to actually start.
    let _j1 = schedule(1, 200);
    std::thread::sleep(Duration::from_millis(30));
    let _j2 = schedule(4, 10);
    let _j3 = schedule(5, 10);
    let j4 = schedule(2, 10);
    let _j5 = schedule(6, 10);
    let j6 = schedule(3, 10);
    let _j7 = schedule(7, 10);

    // Promote two mid-sequence jobs; they run right after the current one,
    // in promotion order.
    scheduler.prioritize_job(j4);
    scheduler.prioritize_job(j6);

    scheduler.sync_all();
    assert!(
        violations.lock().is_empty(),
        "completion order violated: {:?}",
        violations.lock()
    );
    assert_eq!(*counter.lock(), 7);
}

#[test]
fn cancel_all_spares_only_the_running_job() {
    init_logs();
    let scheduler = JobScheduler::new("test-cancel-all");
    let work = scheduler.add_job_type(
        |_| std::thread::sleep(Duration::from_millis(100)),
        false,
    );
    for _ in 0..10 {
        scheduler.schedule_job(work, Box::new(())).unwrap();
    }

    // Let the worker pick up the first job, then drop the rest.
    std::thread::sleep(Duration::from_millis(30));
    scheduler.cancel_all();
    scheduler.sync_all();

    let (started, completed) = scheduler.counters();
    assert_eq!(started, 1);
    assert_eq!(completed, 1);
}

#[test]
fn stall_detection_reports_after_threshold() {
    init_logs();
    let scheduler = JobScheduler::new("test-stall");
    let slow = scheduler.add_job_type(
        |_| std::thread::sleep(Duration::from_millis(750)),
        false,
    );
    let id = scheduler.schedule_job(slow, Box::new(())).unwrap();

    assert!(scheduler.is_stalling(Duration::from_millis(100)).is_none());

    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(scheduler.is_stalling(Duration::from_millis(100)), Some(id));

    scheduler.sync_all();
    assert!(scheduler.is_stalling(Duration::from_millis(100)).is_none());
}

#[test]
fn overwritable_collapse_survives_a_full_pipeline() {
    init_logs();
    let scheduler = JobScheduler::new("test-collapse");
    let gate = scheduler.add_job_type(
        |_| std::thread::sleep(Duration::from_millis(100)),
        false,
    );
    let applied = Arc::new(Mutex::new(Vec::new()));
    let applied_in_job = applied.clone();
    let update = scheduler.add_job_type(
        move |payload| {
            applied_in_job
                .lock()
                .push(*payload.downcast::<u32>().unwrap());
        },
        true,
    );

    scheduler.schedule_job(gate, Box::new(())).unwrap();
    let first = scheduler.schedule_job(update, Box::new(10u32)).unwrap();
    for value in 11..20u32 {
        let id = scheduler.schedule_job(update, Box::new(value)).unwrap();
        assert_eq!(id, first, "resubmission keeps the original id");
    }

    scheduler.sync_all();
    assert_eq!(*applied.lock(), vec![19], "only the newest payload applies");
}
