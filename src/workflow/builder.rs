//! Workflow builder
//!
//! Accumulates candidate sources, processors and sinks and resolves them
//! into a single extractor, transformer and loader at build time.

use super::WorkflowDescriptor;
use crate::disposable::Disposable;
use crate::error::EtlError;
use crate::etl::{
    FailurePolicy, FanInSource, FanOutSink, Gather, IdentityTransformer, NullSink,
    ProcessorChain, ProcessorRef, SinkRef, SourceRef,
};
use std::sync::Arc;

type DefaultProcessorFactory<R, P> = Box<dyn Fn() -> ProcessorRef<R, P> + Send + Sync>;
type DefaultSinkFactory<P> = Box<dyn Fn() -> SinkRef<P> + Send + Sync>;
type CompositeSourceFactory<R> =
    Box<dyn Fn(Vec<SourceRef<R>>) -> Result<SourceRef<R>, EtlError> + Send + Sync>;
type CompositeProcessorFactory<R, P> =
    Box<dyn Fn(Vec<ProcessorRef<R, P>>) -> Result<ProcessorRef<R, P>, EtlError> + Send + Sync>;
type CompositeSinkFactory<P> =
    Box<dyn Fn(Vec<SinkRef<P>>) -> Result<SinkRef<P>, EtlError> + Send + Sync>;

fn fan_in_factory<R>(policy: FailurePolicy) -> CompositeSourceFactory<R>
where
    R: Gather + Send + 'static,
{
    Box::new(move |sources| {
        let fan_in = FanInSource::new(sources)?.with_policy(policy);
        let source: SourceRef<R> = Arc::new(fan_in.gathered());
        Ok(source)
    })
}

fn fan_out_factory<P>(policy: FailurePolicy) -> CompositeSinkFactory<P>
where
    P: Clone + Send + Sync + 'static,
{
    Box::new(move |sinks| {
        let sink: SinkRef<P> = Arc::new(FanOutSink::new(sinks)?.with_policy(policy));
        Ok(sink)
    })
}

/// Builder of [`WorkflowDescriptor`]s
///
/// Resolution rules applied by [`build`](WorkflowBuilder::build):
/// - Sources: none is an error, one is used as is, several are combined by
///   the composite-source factory (for [`Gather`] types, a [`FanInSource`]
///   whose parts are merged by default).
/// - Processors: none uses the default-processor factory (a pass-through
///   for [`WorkflowBuilder::new`]), one is used as is, several need a
///   composite-processor factory.
/// - Sinks: none uses the default-sink factory (a [`NullSink`]), one is used
///   as is, several are combined by the composite-sink factory (a
///   [`FanOutSink`] by default).
///
/// # Example
/// ```
/// use etl_runtime::etl::{extractor_fn, loader_fn};
/// use etl_runtime::workflow::WorkflowBuilder;
/// use std::sync::Arc;
///
/// # fn example() -> eyre::Result<()> {
/// let mut builder = WorkflowBuilder::<Vec<i32>, Vec<i32>>::new("numbers", "Numbers");
/// builder.add_source(Arc::new(extractor_fn(|| async { Ok(vec![1, 2]) })))?;
/// builder.add_source(Arc::new(extractor_fn(|| async { Ok(vec![3]) })))?;
/// builder.add_sink(Arc::new(loader_fn(|numbers: Vec<i32>| async move {
///     println!("{:?}", numbers);
///     Ok(())
/// })))?;
///
/// let descriptor = builder.build()?;
/// assert_eq!(descriptor.id(), "numbers");
/// # Ok(())
/// # }
/// ```
pub struct WorkflowBuilder<R, P> {
    id: String,
    name: String,
    description: Option<String>,
    sources: Vec<SourceRef<R>>,
    processors: Vec<ProcessorRef<R, P>>,
    sinks: Vec<SinkRef<P>>,
    default_processor_factory: DefaultProcessorFactory<R, P>,
    default_sink_factory: DefaultSinkFactory<P>,
    composite_source_factory: CompositeSourceFactory<R>,
    composite_processor_factory: Option<CompositeProcessorFactory<R, P>>,
    composite_sink_factory: CompositeSinkFactory<P>,
}

impl<T> WorkflowBuilder<T, T>
where
    T: Gather + Clone + Send + Sync + 'static,
{
    /// Create a builder whose default processor passes data through unchanged
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::with_default_processor(id, name, || Arc::new(IdentityTransformer::new()))
    }
}

impl<T> WorkflowBuilder<T, T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Combine several registered processors by running them in order
    pub fn with_processor_chain(self) -> Self {
        self.with_composite_processor_factory(|processors| {
            Ok(Arc::new(ProcessorChain::new(processors)?))
        })
    }
}

impl<R, P> WorkflowBuilder<R, P>
where
    R: Gather + Send + 'static,
    P: Clone + Send + Sync + 'static,
{
    /// Create a builder with a custom default-processor factory
    ///
    /// Several sources are fanned in and their parts merged with [`Gather`].
    pub fn with_default_processor<F>(
        id: impl Into<String>,
        name: impl Into<String>,
        default_processor_factory: F,
    ) -> Self
    where
        F: Fn() -> ProcessorRef<R, P> + Send + Sync + 'static,
    {
        Self::with_stage_factories(
            id,
            name,
            default_processor_factory,
            fan_in_factory(FailurePolicy::BestEffort),
        )
    }

    /// Use a default fan-in aggregate with the given failure policy
    pub fn with_source_policy(mut self, policy: FailurePolicy) -> Self {
        self.composite_source_factory = fan_in_factory(policy);
        self
    }
}

impl<R, P> WorkflowBuilder<R, P>
where
    R: Send + 'static,
    P: Clone + Send + Sync + 'static,
{
    /// Create a builder with explicit default-processor and composite-source
    /// factories
    ///
    /// Places no merge requirement on `R`; the composite-source factory is
    /// only called when more than one source is registered.
    pub fn with_stage_factories<F, S>(
        id: impl Into<String>,
        name: impl Into<String>,
        default_processor_factory: F,
        composite_source_factory: S,
    ) -> Self
    where
        F: Fn() -> ProcessorRef<R, P> + Send + Sync + 'static,
        S: Fn(Vec<SourceRef<R>>) -> Result<SourceRef<R>, EtlError> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            sources: Vec::new(),
            processors: Vec::new(),
            sinks: Vec::new(),
            default_processor_factory: Box::new(default_processor_factory),
            default_sink_factory: Box::new(|| Arc::new(NullSink::new())),
            composite_source_factory: Box::new(composite_source_factory),
            composite_processor_factory: None,
            composite_sink_factory: fan_out_factory(FailurePolicy::FailFast),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_default_sink_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> SinkRef<P> + Send + Sync + 'static,
    {
        self.default_sink_factory = Box::new(factory);
        self
    }

    pub fn with_composite_source_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(Vec<SourceRef<R>>) -> Result<SourceRef<R>, EtlError> + Send + Sync + 'static,
    {
        self.composite_source_factory = Box::new(factory);
        self
    }

    pub fn with_composite_processor_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(Vec<ProcessorRef<R, P>>) -> Result<ProcessorRef<R, P>, EtlError>
            + Send
            + Sync
            + 'static,
    {
        self.composite_processor_factory = Some(Box::new(factory));
        self
    }

    pub fn with_composite_sink_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(Vec<SinkRef<P>>) -> Result<SinkRef<P>, EtlError> + Send + Sync + 'static,
    {
        self.composite_sink_factory = Box::new(factory);
        self
    }

    /// Use a default fan-out aggregate with the given failure policy
    pub fn with_sink_policy(mut self, policy: FailurePolicy) -> Self {
        self.composite_sink_factory = fan_out_factory(policy);
        self
    }

    /// Register a data source and hand it back
    ///
    /// # Errors
    /// Returns a configuration error if the source is already disposed.
    pub fn add_source(&mut self, source: SourceRef<R>) -> Result<SourceRef<R>, EtlError> {
        ensure_usable(source.as_ref(), "source")?;
        self.sources.push(source.clone());
        Ok(source)
    }

    /// Register a data processor and hand it back
    ///
    /// # Errors
    /// Returns a configuration error if the processor is already disposed.
    pub fn add_processor(
        &mut self,
        processor: ProcessorRef<R, P>,
    ) -> Result<ProcessorRef<R, P>, EtlError> {
        ensure_usable(processor.as_ref(), "processor")?;
        self.processors.push(processor.clone());
        Ok(processor)
    }

    /// Register a data sink and hand it back
    ///
    /// # Errors
    /// Returns a configuration error if the sink is already disposed.
    pub fn add_sink(&mut self, sink: SinkRef<P>) -> Result<SinkRef<P>, EtlError> {
        ensure_usable(sink.as_ref(), "sink")?;
        self.sinks.push(sink.clone());
        Ok(sink)
    }

    /// Resolve the registered stages into a descriptor
    ///
    /// # Errors
    /// Returns a configuration error if no source was registered, if several
    /// processors were registered without a composite-processor factory, if
    /// a composite factory rejects its members, or if the id is invalid.
    pub fn build(&self) -> Result<WorkflowDescriptor<R, P>, EtlError> {
        log::debug!(
            "Building workflow '{}' from {} source(s), {} processor(s), {} sink(s)",
            self.id,
            self.sources.len(),
            self.processors.len(),
            self.sinks.len()
        );

        let descriptor = WorkflowDescriptor::new(
            self.id.clone(),
            self.name.clone(),
            self.build_source()?,
            self.build_processor()?,
            self.build_sink()?,
        )?;
        Ok(descriptor.with_description(self.description.clone()))
    }

    fn build_source(&self) -> Result<SourceRef<R>, EtlError> {
        match self.sources.as_slice() {
            [] => Err(EtlError::configuration(format!(
                "workflow '{}': at least one source required",
                self.id
            ))),
            [source] => Ok(source.clone()),
            sources => (self.composite_source_factory)(sources.to_vec()),
        }
    }

    fn build_processor(&self) -> Result<ProcessorRef<R, P>, EtlError> {
        match self.processors.as_slice() {
            [] => Ok((self.default_processor_factory)()),
            [processor] => Ok(processor.clone()),
            processors => match &self.composite_processor_factory {
                Some(factory) => factory(processors.to_vec()),
                None => Err(EtlError::configuration(format!(
                    "workflow '{}': {} processors registered but no composite processor factory set",
                    self.id,
                    processors.len()
                ))),
            },
        }
    }

    fn build_sink(&self) -> Result<SinkRef<P>, EtlError> {
        match self.sinks.as_slice() {
            [] => Ok((self.default_sink_factory)()),
            [sink] => Ok(sink.clone()),
            sinks => (self.composite_sink_factory)(sinks.to_vec()),
        }
    }
}

fn ensure_usable(stage: &dyn Disposable, kind: &str) -> Result<(), EtlError> {
    if stage.is_disposed() {
        return Err(EtlError::configuration(format!(
            "cannot register a disposed {}",
            kind
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etl::{Extractor, Loader, extractor_fn, loader_fn, transformer_fn};
    use serde_json::{Value, json};

    fn source(values: Vec<i32>) -> SourceRef<Vec<i32>> {
        Arc::new(extractor_fn(move || {
            let values = values.clone();
            async move { Ok(values) }
        }))
    }

    #[test]
    fn test_zero_sources_is_a_configuration_error() {
        let builder = WorkflowBuilder::<Vec<i32>, Vec<i32>>::new("empty", "Empty");
        let err = builder.build().unwrap_err();
        assert!(matches!(err, EtlError::Configuration(ref msg) if msg.contains("at least one source")));
    }

    #[test]
    fn test_single_source_is_not_wrapped() {
        let mut builder = WorkflowBuilder::new("single", "Single");
        let registered = builder.add_source(source(vec![1])).unwrap();

        let descriptor = builder.build().unwrap();
        assert!(Arc::ptr_eq(descriptor.extractor(), &registered));
    }

    #[tokio::test]
    async fn test_two_sources_are_fanned_in() {
        let mut builder = WorkflowBuilder::new("multi", "Multi");
        let first = builder.add_source(source(vec![1, 2])).unwrap();
        let second = builder.add_source(source(vec![3])).unwrap();

        let descriptor = builder.build().unwrap();
        assert!(!Arc::ptr_eq(descriptor.extractor(), &first));
        assert_eq!(descriptor.extractor().extract().await.unwrap(), vec![1, 2, 3]);

        descriptor.extractor().dispose();
        assert!(first.is_disposed());
        assert!(second.is_disposed());
    }

    #[tokio::test]
    async fn test_zero_sinks_discards_input() {
        let mut builder = WorkflowBuilder::<Value, Value>::new("discard", "Discard");
        builder
            .add_source(Arc::new(extractor_fn(|| async { Ok(json!({"x": 1})) })))
            .unwrap();

        let descriptor = builder.build().unwrap();
        for value in [json!(null), json!({"x": 1}), json!([1, 2, 3]), json!("text")] {
            descriptor.loader().load(value).await.unwrap();
        }
    }

    #[test]
    fn test_default_processor_is_used() {
        let mut builder = WorkflowBuilder::new("identity", "Identity");
        builder.add_source(source(vec![1])).unwrap();

        let descriptor = builder.build().unwrap();
        assert_eq!(
            descriptor.transformer().transform(vec![4, 5]).unwrap(),
            vec![4, 5]
        );
    }

    #[test]
    fn test_several_processors_need_a_composite_factory() {
        let mut builder = WorkflowBuilder::new("procs", "Processors");
        builder.add_source(source(vec![1])).unwrap();
        for _ in 0..2 {
            builder
                .add_processor(Arc::new(transformer_fn(|v: Vec<i32>| Ok(v))))
                .unwrap();
        }

        let err = builder.build().unwrap_err();
        assert!(matches!(err, EtlError::Configuration(_)));
    }

    #[test]
    fn test_processor_chain_runs_in_registration_order() {
        let mut builder = WorkflowBuilder::new("chain", "Chain").with_processor_chain();
        builder.add_source(source(vec![1])).unwrap();
        builder
            .add_processor(Arc::new(transformer_fn(|mut v: Vec<i32>| {
                v.push(10);
                Ok(v)
            })))
            .unwrap();
        builder
            .add_processor(Arc::new(transformer_fn(|v: Vec<i32>| {
                Ok(v.into_iter().map(|x| x * 2).collect())
            })))
            .unwrap();

        let descriptor = builder.build().unwrap();
        assert_eq!(descriptor.transformer().transform(vec![1]).unwrap(), vec![2, 20]);
    }

    #[tokio::test]
    async fn test_two_sinks_are_fanned_out() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut builder = WorkflowBuilder::new("fan-out", "Fan out");
        builder.add_source(source(vec![1])).unwrap();
        for _ in 0..2 {
            let seen = seen.clone();
            builder
                .add_sink(Arc::new(loader_fn(move |v: Vec<i32>| {
                    let seen = seen.clone();
                    async move {
                        seen.lock().unwrap().push(v);
                        Ok(())
                    }
                })))
                .unwrap();
        }

        let descriptor = builder.build().unwrap();
        descriptor.loader().load(vec![7]).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![vec![7], vec![7]]);
    }

    #[test]
    fn test_disposed_stage_cannot_be_registered() {
        let mut builder = WorkflowBuilder::new("stale", "Stale");
        let stale = source(vec![1]);
        stale.dispose();

        let err = builder.add_source(stale).err().expect("expected error");
        assert!(matches!(err, EtlError::Configuration(_)));
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Summary {
        total: u32,
    }

    fn summary_builder(id: &str) -> WorkflowBuilder<Summary, Summary> {
        WorkflowBuilder::with_stage_factories(
            id,
            "Summary",
            || Arc::new(IdentityTransformer::new()),
            |_| Err(EtlError::configuration("summaries cannot be merged")),
        )
    }

    #[tokio::test]
    async fn test_single_source_over_plain_struct() {
        let seen = Arc::new(std::sync::Mutex::new(None));
        let mut builder = summary_builder("summary");
        builder
            .add_source(Arc::new(extractor_fn(|| async { Ok(Summary { total: 7 }) })))
            .unwrap();
        {
            let seen = seen.clone();
            builder
                .add_sink(Arc::new(loader_fn(move |summary: Summary| {
                    let seen = seen.clone();
                    async move {
                        *seen.lock().unwrap() = Some(summary);
                        Ok(())
                    }
                })))
                .unwrap();
        }

        let descriptor = builder.build().unwrap();
        let extracted = descriptor.extractor().extract().await.unwrap();
        let processed = descriptor.transformer().transform(extracted).unwrap();
        descriptor.loader().load(processed).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(Summary { total: 7 }));
    }

    #[test]
    fn test_composite_source_factory_decides_for_plain_struct() {
        let mut builder = summary_builder("summaries");
        for total in [1, 2] {
            builder
                .add_source(Arc::new(extractor_fn(move || async move {
                    Ok(Summary { total })
                })))
                .unwrap();
        }

        let err = builder.build().unwrap_err();
        assert!(matches!(err, EtlError::Configuration(ref msg) if msg.contains("cannot be merged")));
    }

    #[test]
    fn test_descriptor_is_stamped() {
        let mut builder =
            WorkflowBuilder::new("stamped", "Stamped").with_description("Has a description");
        builder.add_source(source(vec![1])).unwrap();

        let descriptor = builder.build().unwrap();
        assert_eq!(descriptor.id(), "stamped");
        assert_eq!(descriptor.name(), "Stamped");
        assert_eq!(descriptor.description(), Some("Has a description"));
    }
}
