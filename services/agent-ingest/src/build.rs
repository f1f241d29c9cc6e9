use crate::config::{PipelineConfig, ShdrVersionConfig};
use contract::Contract;
use delivery::{ComputeMetrics, DeliverObservation};
use filters::{DeltaFilter, DuplicateFilter, PeriodFilter, TimestampCorrector};
use entity::Observation;
use pipeline::{Frame, Pipeline, PipelineContext, Strand, Transform};
use shdr::{ShdrVersion, TimestampExtractor, TimestampMode, TokenMapper, Tokenizer};
use std::sync::Arc;
use topics::{DataMapper, JsonMapper, TopicRouter};
use tracing::warn;
use validator::Validator;

/// Wires the whole pipeline (§4 C4-C10) the way `pipeline::Pipeline` is
/// meant to be built: a handful of `last_after` calls anchored on the
/// previous stage's name, with the SHDR and topic-routed entry points
/// joining into one shared filter/validate/deliver tail.
pub struct BuiltPipeline {
    pub pipeline: Arc<Pipeline<Frame>>,
    pub strand: Strand,
    pub observation_counter: Arc<std::sync::atomic::AtomicU64>,
}

pub fn build(config: &PipelineConfig, contract: Arc<dyn Contract>) -> anyhow::Result<BuiltPipeline> {
    let context = Arc::new(PipelineContext::new(contract.clone()));
    let pipeline = Arc::new(Pipeline::<Frame>::new());
    let strand = Strand::spawn();
    let strand_handle = strand.handle();

    let shdr_version = match config.shdr_version {
        ShdrVersionConfig::V1 => ShdrVersion::V1,
        ShdrVersionConfig::V2 => ShdrVersion::V2,
    };
    let timestamp_mode = if config.ignore_timestamps {
        TimestampMode::Ignore
    } else if config.relative_time {
        TimestampMode::Relative
    } else {
        TimestampMode::Absolute
    };

    // SHDR line entry point.
    pipeline.last_after("start", Arc::new(Tokenizer));
    pipeline.last_after("tokenizer", Arc::new(TimestampExtractor::new(timestamp_mode)));
    pipeline.last_after(
        "timestamp_extractor",
        Arc::new(TokenMapper::new(contract.clone(), shdr_version, config.device.clone())),
    );

    // Topic-routed entry point (pub/sub transport), a sibling of the
    // tokenizer under `start`.
    pipeline.last_after(
        "start",
        Arc::new(TopicRouter::new(contract.clone(), config.device.clone())),
    );
    // A JSON batch can mix observation, asset, and asset-command frames;
    // `JsonMapper::apply` hands back only the first and re-enters the graph
    // at its own node for the rest, so they still pass through the filter
    // chain attached below instead of being dropped.
    let json_mapper_weak = Arc::downgrade(&pipeline);
    let json_mapper_forward = Arc::new(move |frame: Frame| {
        let Some(pipeline) = json_mapper_weak.upgrade() else {
            return;
        };
        if let Err(e) = pipeline.run_at("json_mapper", frame) {
            warn!(error = %e, "json mapper could not re-enter the pipeline for an extra frame");
        }
    }) as Arc<dyn Fn(Frame) + Send + Sync>;
    pipeline.last_after(
        "topic_router",
        Arc::new(JsonMapper::new(contract.clone(), config.device.clone(), json_mapper_forward)),
    );
    pipeline.last_after(
        "topic_router",
        Arc::new(DataMapper::new(contract.clone(), config.device.clone(), shdr_version)),
    );

    // Shared tail: every frame-producing stage above feeds the same filter
    // chain, validator, and delivery stages. `last_after` anchors on a name
    // and finds every node with it, so each `for` below attaches one
    // instance per entry-point branch in a single call.
    let entry_points = ["token_mapper", "json_mapper", "data_mapper"];
    if config.filter_duplicates {
        for anchor in entry_points {
            pipeline.last_after(anchor, Arc::new(DuplicateFilter::new(context.clone())));
        }
        pipeline.last_after("duplicate_filter", Arc::new(DeltaFilter::new(context.clone())));
    } else {
        for anchor in entry_points {
            pipeline.last_after(anchor, Arc::new(DeltaFilter::new(context.clone())));
        }
    }

    let deliver = Arc::new(DeliverObservation::new(contract.clone()));

    // `PeriodFilter` releases observations outside its synchronous return
    // value (a timer firing, or a second value alongside the one it hands
    // back). Those still need timestamp correction and validation, so they
    // re-enter the graph at `timestamp_corrector` instead of going straight
    // to delivery. A weak pipeline handle avoids a reference cycle: the
    // pipeline's own tree holds this closure via the `PeriodFilter` node.
    let pipeline_weak = Arc::downgrade(&pipeline);
    let period_forward = Arc::new(move |obs: Observation| {
        let Some(pipeline) = pipeline_weak.upgrade() else {
            return;
        };
        if let Err(e) = pipeline.run_at("timestamp_corrector", Frame::Observation(obs)) {
            warn!(error = %e, "period filter release did not re-enter the pipeline");
        }
    }) as Arc<dyn Fn(Observation) + Send + Sync>;

    // `ComputeMetrics` synthesizes a metrics observation after delivery has
    // already run for the triggering one; it legitimately bypasses the
    // filter/validate chain and hands straight to `deliver`.
    let metrics_forward = {
        let deliver = deliver.clone();
        Arc::new(move |obs: Observation| {
            deliver.apply(Frame::Observation(obs));
        }) as Arc<dyn Fn(Observation) + Send + Sync>
    };

    pipeline.last_after(
        "delta_filter",
        Arc::new(PeriodFilter::new(context.clone(), strand_handle.clone(), period_forward)),
    );
    pipeline.last_after("period_filter", Arc::new(TimestampCorrector::new(context.clone())));
    pipeline.last_after("timestamp_corrector", Arc::new(Validator::new(context.clone())));
    pipeline.last_after("validator", deliver.clone());
    pipeline.last_after(
        "deliver_observation",
        Arc::new(
            ComputeMetrics::new(
                deliver.counter(),
                config.metrics_data_item.clone(),
                Some(config.device.clone()),
                metrics_forward,
            )
            .with_interval(config.metrics_interval),
        ),
    );

    pipeline.start_transforms(&strand_handle);

    Ok(BuiltPipeline {
        pipeline,
        strand,
        observation_counter: deliver.counter(),
    })
}
