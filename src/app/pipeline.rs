//! Shared run logic used by the CLI front-end and the integration tests.
//!
//! One run goes: discover -> load -> (plant capacity) -> per request:
//! align -> convert -> aggregate. A source that fails to load only fails the
//! requests that need its variable.

use tracing::{info, warn};

use crate::align::align;
use crate::config::{PipelineConfig, RequestConfig};
use crate::data::{PlantRegistry, load_registry};
use crate::domain::{
    AggregatedResult, AlignedDataset, GenerationType, LoadedSource, PowerEstimate,
    ProvenanceSummary, SourceDescriptor,
};
use crate::error::{PipelineError, PipelineResult};
use crate::io::{discover_sources, load_sources};
use crate::power::{CapacityMap, ConversionParams, convert_dataset};
use crate::report::{AggregationQuery, aggregate_by_period};

/// All computed outputs of one `repower run`.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub outcomes: Vec<RequestOutcome>,
    pub load_failures: Vec<(SourceDescriptor, PipelineError)>,
    pub sources_loaded: usize,
}

impl RunOutput {
    pub fn first_failure(&self) -> Option<(&str, &PipelineError)> {
        self.outcomes
            .iter()
            .find_map(|o| o.result.as_ref().err().map(|e| (o.name.as_str(), e)))
    }
}

#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub name: String,
    pub generation: GenerationType,
    pub result: Result<RequestOutput, PipelineError>,
}

#[derive(Debug, Clone)]
pub struct RequestOutput {
    pub aligned: AlignedDataset,
    pub estimates: Vec<PowerEstimate>,
    pub results: Vec<AggregatedResult>,
    /// Per aligned variable.
    pub provenance: Vec<(String, ProvenanceSummary)>,
}

/// Execute every configured request.
///
/// Only configuration and discovery problems fail the whole run; everything
/// else is reported per request.
pub fn run_pipeline(config: &PipelineConfig) -> PipelineResult<RunOutput> {
    if config.requests.is_empty() {
        return Err(PipelineError::InvalidConfig(
            "no [[request]] entries configured".to_string(),
        ));
    }

    let variables = config.required_variables();
    let descriptors = discover_sources(&config.data_dir, &variables)?;
    info!(
        data_dir = %config.data_dir.display(),
        variables = variables.len(),
        files = descriptors.len(),
        "discovered sources"
    );

    let mut sources: Vec<LoadedSource> = Vec::new();
    let mut load_failures = Vec::new();
    for (desc, result) in load_sources(&descriptors) {
        match result {
            Ok(source) => sources.push(source),
            Err(e) => load_failures.push((desc, e)),
        }
    }

    let registry = config.plants.as_ref().map(|plants| {
        load_registry(&plants.registry).map(|r| r.filter_countries(&plants.countries))
    });

    let conversion = config.conversion();
    let outcomes = config
        .requests
        .iter()
        .map(|request| RequestOutcome {
            name: request.name.clone(),
            generation: request.generation,
            result: run_request(
                request,
                config,
                &conversion,
                &sources,
                &load_failures,
                registry.as_ref(),
            ),
        })
        .collect::<Vec<_>>();

    for outcome in &outcomes {
        if let Err(e) = &outcome.result {
            warn!(request = %outcome.name, kind = e.kind(), error = %e, "request failed");
        }
    }

    Ok(RunOutput {
        outcomes,
        sources_loaded: sources.len(),
        load_failures,
    })
}

fn run_request(
    request: &RequestConfig,
    config: &PipelineConfig,
    conversion: &ConversionParams,
    sources: &[LoadedSource],
    load_failures: &[(SourceDescriptor, PipelineError)],
    registry: Option<&PipelineResult<PlantRegistry>>,
) -> PipelineResult<RequestOutput> {
    let alignment = request.alignment_request(conversion);

    if let Some((_, e)) = load_failures
        .iter()
        .find(|(desc, _)| alignment.variables.contains(&desc.variable))
    {
        return Err(e.clone());
    }

    let capacity: Option<CapacityMap> = if request.use_plant_capacity {
        let registry = match registry {
            Some(Ok(r)) => r,
            Some(Err(e)) => return Err(e.clone()),
            None => {
                return Err(PipelineError::InvalidConfig(format!(
                    "request `{}` needs a plant registry",
                    request.name
                )));
            }
        };
        let map = registry.capacity_map(
            request.generation,
            &request.grid,
            config.alignment.interpolation_radius_deg,
        )?;
        if map.is_empty() {
            warn!(
                request = %request.name,
                "no registry plant lies on the request grid; using configured capacities"
            );
        }
        Some(map)
    } else {
        None
    };

    let aligned = align(&alignment, sources, &config.alignment)?;
    let estimates = convert_dataset(&aligned, request.generation, conversion, capacity.as_ref())?;

    let mut results = Vec::new();
    for agg in &request.aggregations {
        let query = AggregationQuery {
            selection: agg.selection.clone(),
            window: agg.window(request),
            reduction: agg.reduction,
            generation: Some(request.generation),
        };
        results.extend(aggregate_by_period(&estimates, &query, agg.period)?);
    }

    let provenance = aligned
        .variables
        .iter()
        .map(|v| (v.name.clone(), v.provenance_summary()))
        .collect();

    info!(
        request = %request.name,
        records = estimates.len(),
        results = results.len(),
        "request complete"
    );
    Ok(RequestOutput {
        aligned,
        estimates,
        results,
        provenance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{SyntheticSpec, write_synthetic_tree};
    use crate::domain::Provenance;

    #[test]
    fn synthetic_tree_runs_every_request() {
        let dir = tempfile::tempdir().unwrap();
        let out = write_synthetic_tree(dir.path(), &SyntheticSpec::default()).unwrap();
        let config = PipelineConfig::load(&out.config_path).unwrap();

        let run = run_pipeline(&config).unwrap();
        assert!(run.load_failures.is_empty());
        assert!(run.first_failure().is_none(), "{:?}", run.first_failure());
        assert_eq!(run.outcomes.len(), 3);

        let solar = run.outcomes[0].result.as_ref().unwrap();
        let ssrd = solar.aligned.variable("ssrd").unwrap();
        assert!(ssrd.values.iter().any(|v| v.provenance == Provenance::Observed));
        assert!(ssrd.values.iter().any(|v| v.provenance == Provenance::Climatology));
        assert!(solar.estimates.iter().all(|e| e.power_mw >= 0.0));
    }

    #[test]
    fn broken_source_fails_only_dependent_requests() {
        let dir = tempfile::tempdir().unwrap();
        let out = write_synthetic_tree(dir.path(), &SyntheticSpec::default()).unwrap();
        let dis = crate::io::layout::climatology_path(dir.path(), "dis", "json");
        std::fs::write(&dis, "{ not json").unwrap();

        let config = PipelineConfig::load(&out.config_path).unwrap();
        let run = run_pipeline(&config).unwrap();
        assert_eq!(run.load_failures.len(), 1);
        assert!(run.outcomes[0].result.is_ok());
        assert!(run.outcomes[1].result.is_ok());
        let (name, err) = run.first_failure().unwrap();
        assert_eq!(name, "hydro-basins");
        assert!(matches!(err, PipelineError::SchemaMismatch { .. }));
    }
}
