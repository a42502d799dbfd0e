//! `ResourceStore` backed by a SPARQL endpoint.

use async_trait::async_trait;
use stackgrid_core::{Status, Term, Trigger, Triple};
use tracing::debug;

use crate::accessor::ResourceStore;
use crate::client::{Row, SparqlClient};
use crate::error::StoreResult;
use crate::escape::{escape_iri, escape_string};
use crate::types::{
    NewService, RepositorySource, RunningService, ScalingBound, ServiceRecord, parse_scaling,
};

#[derive(Debug, Clone)]
pub struct SparqlStore {
    client: SparqlClient,
    /// Named graph, already escaped.
    graph: String,
}

impl SparqlStore {
    pub fn new(client: SparqlClient, graph: &str) -> Self {
        Self {
            client,
            graph: escape_iri(graph),
        }
    }

    async fn first_value(&self, query: &str, var: &str) -> StoreResult<Option<String>> {
        let rows = self.client.select(query).await?;
        Ok(rows
            .into_iter()
            .find_map(|mut row| row.remove(var).map(|t| t.value().to_string())))
    }
}

fn take(row: &mut Row, var: &str) -> Option<String> {
    row.remove(var).map(|t| t.value().to_string())
}

#[async_trait]
impl ResourceStore for SparqlStore {
    async fn ping(&self) -> StoreResult<()> {
        self.client.ask("ASK { ?s ?p ?o }").await.map(|_| ())
    }

    async fn resource_id(&self, subject: &str) -> StoreResult<Option<String>> {
        let query = format!(
            "SELECT ?uuid FROM {g} WHERE {{ {s} mu:uuid ?uuid . }} LIMIT 1",
            g = self.graph,
            s = escape_iri(subject),
        );
        self.first_value(&query, "uuid").await
    }

    async fn subject_of(&self, uuid: &str) -> StoreResult<Option<String>> {
        let query = format!(
            "SELECT ?s FROM {g} WHERE {{ ?s mu:uuid {u} . }} LIMIT 1",
            g = self.graph,
            u = escape_string(uuid),
        );
        self.first_value(&query, "s").await
    }

    async fn set_status(&self, uuid: &str, status: Status) -> StoreResult<()> {
        self.set_status_unless(uuid, status, &[]).await
    }

    async fn set_status_unless(
        &self,
        uuid: &str,
        status: Status,
        unless: &[Status],
    ) -> StoreResult<()> {
        let filter = if unless.is_empty() {
            String::new()
        } else {
            let list: Vec<String> = unless.iter().map(|s| escape_iri(&s.iri())).collect();
            format!(
                "FILTER (!BOUND(?old) || ?old NOT IN ({}))",
                list.join(", ")
            )
        };
        let update = format!(
            "WITH {g}\n\
             DELETE {{ ?s swarmui:status ?old . }}\n\
             INSERT {{ ?s swarmui:status {new} . }}\n\
             WHERE {{\n\
                 ?s mu:uuid {u} .\n\
                 OPTIONAL {{ ?s swarmui:status ?old }}\n\
                 {filter}\n\
             }}",
            g = self.graph,
            new = escape_iri(&status.iri()),
            u = escape_string(uuid),
        );
        self.client.update(&update).await?;
        debug!(%uuid, %status, "status written");
        Ok(())
    }

    async fn trigger_values(&self, uuid: &str, trigger: Trigger) -> StoreResult<Vec<Term>> {
        let query = format!(
            "SELECT ?o FROM {g} WHERE {{ ?s mu:uuid {u} ; {p} ?o . }}",
            g = self.graph,
            u = escape_string(uuid),
            p = escape_iri(trigger.predicate()),
        );
        let rows = self.client.select(&query).await?;
        Ok(rows.into_iter().filter_map(|mut row| row.remove("o")).collect())
    }

    async fn clear_trigger(&self, uuid: &str, trigger: Trigger) -> StoreResult<()> {
        let update = format!(
            "WITH {g}\n\
             DELETE {{ ?s {p} ?o . }}\n\
             WHERE {{ ?s mu:uuid {u} ; {p} ?o . }}",
            g = self.graph,
            p = escape_iri(trigger.predicate()),
            u = escape_string(uuid),
        );
        self.client.update(&update).await
    }

    async fn title(&self, uuid: &str) -> StoreResult<Option<String>> {
        let query = format!(
            "SELECT ?title FROM {g} WHERE {{ ?s mu:uuid {u} ; dct:title ?title . }} LIMIT 1",
            g = self.graph,
            u = escape_string(uuid),
        );
        self.first_value(&query, "title").await
    }

    async fn service_pipeline(&self, service_uuid: &str) -> StoreResult<Option<String>> {
        let query = format!(
            "SELECT ?uuid FROM {g} WHERE {{\n\
                 ?service a swarmui:Service ; mu:uuid {u} .\n\
                 ?pipeline a swarmui:Pipeline ; swarmui:services ?service ; mu:uuid ?uuid .\n\
             }} LIMIT 1",
            g = self.graph,
            u = escape_string(service_uuid),
        );
        self.first_value(&query, "uuid").await
    }

    async fn repository_source(&self, repository: &str) -> StoreResult<RepositorySource> {
        let query = format!(
            "SELECT ?location ?branch FROM {g} WHERE {{\n\
                 OPTIONAL {{ {s} doap:location ?location }}\n\
                 OPTIONAL {{ {s} swarmui:branch ?branch }}\n\
             }} LIMIT 1",
            g = self.graph,
            s = escape_iri(repository),
        );
        let mut rows = self.client.select(&query).await?;
        let Some(mut row) = rows.pop() else {
            return Ok(RepositorySource::default());
        };
        Ok(RepositorySource {
            location: take(&mut row, "location").filter(|l| !l.is_empty()),
            branch: take(&mut row, "branch").filter(|b| !b.is_empty()),
        })
    }

    async fn repository_of_pipeline(&self, pipeline_uuid: &str) -> StoreResult<Option<String>> {
        let query = format!(
            "SELECT ?repository FROM {g} WHERE {{\n\
                 ?pipeline mu:uuid {u} .\n\
                 ?repository swarmui:pipelines ?pipeline .\n\
             }} LIMIT 1",
            g = self.graph,
            u = escape_string(pipeline_uuid),
        );
        self.first_value(&query, "repository").await
    }

    async fn repository_pipelines(&self, repository_uuid: &str) -> StoreResult<Vec<String>> {
        let query = format!(
            "SELECT DISTINCT ?uuid FROM {g} WHERE {{\n\
                 ?repository mu:uuid {u} ; swarmui:pipelines ?pipeline .\n\
                 ?pipeline mu:uuid ?uuid .\n\
             }}",
            g = self.graph,
            u = escape_string(repository_uuid),
        );
        let rows = self.client.select(&query).await?;
        Ok(rows.into_iter().filter_map(|mut row| take(&mut row, "uuid")).collect())
    }

    async fn is_last_pipeline(&self, pipeline_uuid: &str) -> StoreResult<bool> {
        let query = format!(
            "ASK FROM {g} WHERE {{\n\
                 ?pipeline mu:uuid {u} .\n\
                 FILTER NOT EXISTS {{\n\
                     ?repository swarmui:pipelines ?pipeline ; swarmui:pipelines ?other .\n\
                     FILTER (?other != ?pipeline)\n\
                 }}\n\
             }}",
            g = self.graph,
            u = escape_string(pipeline_uuid),
        );
        self.client.ask(&query).await
    }

    async fn insert_services(&self, pipeline: &str, services: &[NewService]) -> StoreResult<()> {
        if services.is_empty() {
            return Ok(());
        }
        let pipeline = escape_iri(pipeline);
        let mut body = String::new();
        for service in services {
            let s = escape_iri(&service.subject);
            body.push_str(&format!(
                "{pipeline} swarmui:services {s} .\n\
                 {s} mu:uuid {u} ;\n\
                     dct:title {t} ;\n\
                     swarmui:scaling 0 ;\n\
                     a swarmui:Service ;\n\
                     swarmui:status swarmui:Stopped .\n",
                u = escape_string(&service.uuid),
                t = escape_string(&service.title),
            ));
        }
        let update = format!(
            "INSERT DATA {{ GRAPH {g} {{\n{body}}} }}",
            g = self.graph
        );
        self.client.update(&update).await
    }

    async fn pipeline_services(&self, pipeline_uuid: &str) -> StoreResult<Vec<ServiceRecord>> {
        let query = format!(
            "SELECT ?service ?uuid ?title ?status ?scaling FROM {g} WHERE {{\n\
                 ?pipeline mu:uuid {u} ; swarmui:services ?service .\n\
                 ?service mu:uuid ?uuid .\n\
                 OPTIONAL {{ ?service dct:title ?title }}\n\
                 OPTIONAL {{ ?service swarmui:status ?status }}\n\
                 OPTIONAL {{ ?service swarmui:scaling ?scaling }}\n\
             }}",
            g = self.graph,
            u = escape_string(pipeline_uuid),
        );
        let rows = self.client.select(&query).await?;
        Ok(rows
            .into_iter()
            .filter_map(|mut row| {
                Some(ServiceRecord {
                    subject: take(&mut row, "service")?,
                    uuid: take(&mut row, "uuid")?,
                    title: take(&mut row, "title").unwrap_or_default(),
                    status: take(&mut row, "status").and_then(|s| Status::from_iri(&s)),
                    scaling: take(&mut row, "scaling")
                        .and_then(|s| parse_scaling(&s))
                        .unwrap_or(0),
                })
            })
            .collect())
    }

    async fn set_scaling(&self, uuid: &str, scaling: u32) -> StoreResult<()> {
        let update = format!(
            "WITH {g}\n\
             DELETE {{ ?s swarmui:scaling ?old . }}\n\
             INSERT {{ ?s swarmui:scaling {scaling} . }}\n\
             WHERE {{\n\
                 ?s mu:uuid {u} .\n\
                 OPTIONAL {{ ?s swarmui:scaling ?old }}\n\
             }}",
            g = self.graph,
            u = escape_string(uuid),
        );
        self.client.update(&update).await
    }

    async fn adjust_scaling(&self, uuid: &str, bound: ScalingBound) -> StoreResult<u32> {
        let (n, keep_old) = match bound {
            ScalingBound::AtLeast(n) => (n, "?old > "),
            ScalingBound::AtMost(n) => (n, "?old < "),
        };
        let update = format!(
            "WITH {g}\n\
             DELETE {{ ?s swarmui:scaling ?old . }}\n\
             INSERT {{ ?s swarmui:scaling ?new . }}\n\
             WHERE {{\n\
                 ?s mu:uuid {u} .\n\
                 OPTIONAL {{ ?s swarmui:scaling ?old }}\n\
                 BIND (IF(BOUND(?old) && {keep_old}{n}, ?old, {n}) AS ?new)\n\
             }}",
            g = self.graph,
            u = escape_string(uuid),
        );
        self.client.update(&update).await?;

        let query = format!(
            "SELECT ?scaling FROM {g} WHERE {{ ?s mu:uuid {u} ; swarmui:scaling ?scaling . }} LIMIT 1",
            g = self.graph,
            u = escape_string(uuid),
        );
        Ok(self
            .first_value(&query, "scaling")
            .await?
            .and_then(|s| parse_scaling(&s))
            .unwrap_or(n))
    }

    async fn delete_resource(&self, subject: &str) -> StoreResult<()> {
        let s = escape_iri(subject);
        let update = format!(
            "WITH {g} DELETE {{ {s} ?p ?o . }} WHERE {{ {s} ?p ?o . }} ;\n\
             WITH {g} DELETE {{ ?x ?y {s} . }} WHERE {{ ?x ?y {s} . }}",
            g = self.graph,
        );
        self.client.update(&update).await?;
        debug!(%subject, "resource triples deleted");
        Ok(())
    }

    async fn pipeline_by_project(&self, project: &str) -> StoreResult<Option<String>> {
        let query = format!(
            "SELECT ?uuid FROM {g} WHERE {{\n\
                 ?pipeline a swarmui:Pipeline ; mu:uuid ?uuid .\n\
                 FILTER (LCASE(STR(?uuid)) = {p})\n\
             }} LIMIT 1",
            g = self.graph,
            p = escape_string(&project.to_lowercase()),
        );
        self.first_value(&query, "uuid").await
    }

    async fn service_by_title(
        &self,
        pipeline_uuid: &str,
        title: &str,
    ) -> StoreResult<Option<String>> {
        let query = format!(
            "SELECT ?uuid FROM {g} WHERE {{\n\
                 ?pipeline mu:uuid {p} ; swarmui:services ?service .\n\
                 ?service mu:uuid ?uuid ; dct:title {t} .\n\
             }} LIMIT 1",
            g = self.graph,
            p = escape_string(pipeline_uuid),
            t = escape_string(title),
        );
        self.first_value(&query, "uuid").await
    }

    async fn pending_triggers(&self) -> StoreResult<Vec<Triple>> {
        let predicates: Vec<String> = Trigger::ALL
            .iter()
            .map(|t| escape_iri(t.predicate()))
            .collect();
        let query = format!(
            "SELECT ?s ?p ?o FROM {g} WHERE {{\n\
                 {{\n\
                     VALUES ?p {{ {predicates} }}\n\
                     ?s ?p ?o .\n\
                 }} UNION {{\n\
                     ?s swarmui:pipelines ?o .\n\
                     ?o a swarmui:Pipeline .\n\
                     FILTER NOT EXISTS {{ ?o swarmui:status ?status }}\n\
                     BIND (swarmui:pipelines AS ?p)\n\
                 }}\n\
             }}",
            g = self.graph,
            predicates = predicates.join(" "),
        );
        let rows = self.client.select(&query).await?;
        Ok(rows
            .into_iter()
            .filter_map(|mut row| {
                let s = row.remove("s")?.as_iri()?.to_string();
                let p = row.remove("p")?.as_iri()?.to_string();
                let o = row.remove("o")?;
                Some(Triple::new(s, p, o))
            })
            .collect())
    }

    async fn running_services(&self) -> StoreResult<Vec<RunningService>> {
        let query = format!(
            "SELECT ?pipeline ?service ?title ?scaling FROM {g} WHERE {{\n\
                 ?p a swarmui:Pipeline ; mu:uuid ?pipeline ; swarmui:services ?s .\n\
                 ?s mu:uuid ?service ; swarmui:status ?status .\n\
                 OPTIONAL {{ ?s dct:title ?title }}\n\
                 OPTIONAL {{ ?s swarmui:scaling ?scaling }}\n\
                 FILTER (?status IN ({up}, {started}))\n\
             }}",
            g = self.graph,
            up = escape_iri(&Status::Up.iri()),
            started = escape_iri(&Status::Started.iri()),
        );
        let rows = self.client.select(&query).await?;
        Ok(rows
            .into_iter()
            .filter_map(|mut row| {
                Some(RunningService {
                    pipeline: take(&mut row, "pipeline")?,
                    service: take(&mut row, "service")?,
                    title: take(&mut row, "title").unwrap_or_default(),
                    scaling: take(&mut row, "scaling")
                        .and_then(|s| parse_scaling(&s))
                        .unwrap_or(0),
                })
            })
            .collect())
    }
}
