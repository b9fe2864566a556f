//! Pipeline assembly and execution

use crate::core::cancellation::CancellationToken;
use crate::core::config::PipelineSettings;
use crate::core::error::BuildError;
use crate::core::outcome::Outcome;
use crate::core::step::{ContinuationStep, ErrorAwareStep, TerminalStep};
use crate::execution::link::{ContinuationLink, ErrorAwareLink, Link, TerminalLink};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

/// An assembled, immutable chain of steps
///
/// Cloning is cheap and clones share the same steps. Any number of runs may
/// be in flight at once; nothing is shared between them apart from the steps
/// themselves.
pub struct Pipeline<Req, Res> {
    settings: Arc<PipelineSettings>,
    stages: Arc<[String]>,
    entry: Arc<dyn Link<Req, Res>>,
}

impl<Req, Res> Clone for Pipeline<Req, Res> {
    fn clone(&self) -> Self {
        Self {
            settings: self.settings.clone(),
            stages: self.stages.clone(),
            entry: self.entry.clone(),
        }
    }
}

impl<Req, Res> fmt::Debug for Pipeline<Req, Res> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.settings.name)
            .field("stages", &self.stages)
            .finish()
    }
}

impl<Req: Send + 'static, Res: Send + 'static> Pipeline<Req, Res> {
    /// Start assembling a pipeline, outermost step first
    pub fn builder() -> PipelineBuilder<Req, Res, Req, Res> {
        Self::builder_with(PipelineSettings::default())
    }

    pub fn builder_with(settings: PipelineSettings) -> PipelineBuilder<Req, Res, Req, Res> {
        PipelineBuilder {
            settings,
            stages: Vec::new(),
            wrap: Box::new(|link: Arc<dyn Link<Req, Res>>| link),
        }
    }

    /// Assemble a pipeline whose stages all share one request and response type
    ///
    /// Stages are given outermost first and the last one must be the only
    /// terminal stage.
    pub fn from_stages(
        settings: PipelineSettings,
        mut stages: Vec<Stage<Req, Res>>,
    ) -> Result<Self, BuildError> {
        settings.validate()?;

        let len = stages.len();
        let names: Vec<String> = stages.iter().map(|s| s.name().to_string()).collect();

        let terminal = match stages.pop() {
            None => return Err(BuildError::Empty),
            Some(Stage::Terminal(step)) => step,
            Some(_) => {
                return Err(match stages.iter().position(Stage::is_terminal) {
                    Some(index) => BuildError::TerminalNotLast { index, len },
                    None => BuildError::MissingTerminal,
                })
            }
        };

        let trace = settings.trace_stages;
        let mut chain: Arc<dyn Link<Req, Res>> = Arc::new(TerminalLink::new(terminal, trace));
        for (index, stage) in stages.into_iter().enumerate().rev() {
            chain = match stage {
                Stage::Continuation(step) => Arc::new(ContinuationLink::new(step, chain, trace)),
                Stage::ErrorAware(step) => Arc::new(ErrorAwareLink::new(step, chain, trace)),
                Stage::Terminal(_) => return Err(BuildError::TerminalNotLast { index, len }),
            };
        }

        Ok(Self::assembled(settings, names, chain))
    }

    fn assembled(
        settings: PipelineSettings,
        stages: Vec<String>,
        entry: Arc<dyn Link<Req, Res>>,
    ) -> Self {
        debug!(
            "Assembled pipeline {} with stages [{}]",
            settings.name,
            stages.join(" -> ")
        );
        Self {
            settings: Arc::new(settings),
            stages: stages.into(),
            entry,
        }
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    /// Stage names, outermost first
    pub fn stages(&self) -> &[String] {
        &self.stages
    }

    /// Run one request through the chain
    ///
    /// Always yields an [`Outcome`]: the final success value, the error that
    /// escaped every error-aware stage, or the cancellation outcome. If
    /// `cancel` is already set no step runs at all.
    pub async fn run(&self, request: Req, cancel: &CancellationToken) -> Outcome<Res> {
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline.run", pipeline = %self.settings.name, %run_id);

        async move {
            if cancel.is_cancelled() {
                info!("Run cancelled before it started");
                return Outcome::cancelled();
            }

            debug!("Starting run");
            let outcome = self.entry.call(request, cancel).await;

            match &outcome {
                Outcome::Ok(_) => info!("Run completed"),
                Outcome::Error(payload) if payload.is_cancelled() => info!("Run cancelled"),
                Outcome::Error(payload) => info!("Run failed: {:?}", payload),
            }
            outcome
        }
        .instrument(span)
        .await
    }
}

type Wrap<Req, Res, HoleReq, HoleRes> =
    Box<dyn FnOnce(Arc<dyn Link<HoleReq, HoleRes>>) -> Arc<dyn Link<Req, Res>>>;

/// Typed, outermost-first pipeline builder
///
/// `HoleReq`/`HoleRes` are the types the next step added must accept and
/// produce. A pipeline only comes out of [`terminal`](Self::terminal), so a
/// chain without a terminal step, or with steps whose types don't line up,
/// doesn't compile.
pub struct PipelineBuilder<Req, Res, HoleReq, HoleRes> {
    settings: PipelineSettings,
    stages: Vec<String>,
    wrap: Wrap<Req, Res, HoleReq, HoleRes>,
}

impl<Req, Res, HoleReq, HoleRes> PipelineBuilder<Req, Res, HoleReq, HoleRes>
where
    Req: Send + 'static,
    Res: Send + 'static,
    HoleReq: Send + 'static,
    HoleRes: Send + 'static,
{
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.settings.name = name.into();
        self
    }

    /// Append an error-blind step
    pub fn step<S>(self, step: S) -> PipelineBuilder<Req, Res, S::NextRequest, S::NextResponse>
    where
        S: ContinuationStep<HoleReq, HoleRes> + 'static,
    {
        let PipelineBuilder {
            settings,
            mut stages,
            wrap,
        } = self;
        stages.push(step.name().to_string());
        let trace = settings.trace_stages;

        PipelineBuilder {
            settings,
            stages,
            wrap: Box::new(
                move |inner: Arc<dyn Link<S::NextRequest, S::NextResponse>>| {
                    let link: Arc<dyn Link<HoleReq, HoleRes>> =
                        Arc::new(ContinuationLink::new(step, inner, trace));
                    wrap(link)
                },
            ),
        }
    }

    /// Append a step that sees downstream failures
    pub fn error_aware<S>(
        self,
        step: S,
    ) -> PipelineBuilder<Req, Res, S::NextRequest, S::NextResponse>
    where
        S: ErrorAwareStep<HoleReq, HoleRes> + 'static,
    {
        let PipelineBuilder {
            settings,
            mut stages,
            wrap,
        } = self;
        stages.push(step.name().to_string());
        let trace = settings.trace_stages;

        PipelineBuilder {
            settings,
            stages,
            wrap: Box::new(
                move |inner: Arc<dyn Link<S::NextRequest, S::NextResponse>>| {
                    let link: Arc<dyn Link<HoleReq, HoleRes>> =
                        Arc::new(ErrorAwareLink::new(step, inner, trace));
                    wrap(link)
                },
            ),
        }
    }

    /// Close the chain with its innermost step
    pub fn terminal<S>(self, step: S) -> Pipeline<Req, Res>
    where
        S: TerminalStep<HoleReq, HoleRes> + 'static,
    {
        let PipelineBuilder {
            settings,
            mut stages,
            wrap,
        } = self;
        stages.push(step.name().to_string());

        let link: Arc<dyn Link<HoleReq, HoleRes>> =
            Arc::new(TerminalLink::new(step, settings.trace_stages));
        Pipeline::assembled(settings, stages, wrap(link))
    }
}

/// A step for [`Pipeline::from_stages`]
pub enum Stage<Req, Res> {
    Continuation(Arc<dyn ContinuationStep<Req, Res, NextRequest = Req, NextResponse = Res>>),
    ErrorAware(Arc<dyn ErrorAwareStep<Req, Res, NextRequest = Req, NextResponse = Res>>),
    Terminal(Arc<dyn TerminalStep<Req, Res>>),
}

impl<Req: Send + 'static, Res: Send + 'static> Stage<Req, Res> {
    pub fn continuation<S>(step: S) -> Self
    where
        S: ContinuationStep<Req, Res, NextRequest = Req, NextResponse = Res> + 'static,
    {
        Stage::Continuation(Arc::new(step))
    }

    pub fn error_aware<S>(step: S) -> Self
    where
        S: ErrorAwareStep<Req, Res, NextRequest = Req, NextResponse = Res> + 'static,
    {
        Stage::ErrorAware(Arc::new(step))
    }

    pub fn terminal<S>(step: S) -> Self
    where
        S: TerminalStep<Req, Res> + 'static,
    {
        Stage::Terminal(Arc::new(step))
    }

    pub fn name(&self) -> &str {
        match self {
            Stage::Continuation(step) => step.name(),
            Stage::ErrorAware(step) => step.name(),
            Stage::Terminal(step) => step.name(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Terminal(_))
    }
}
