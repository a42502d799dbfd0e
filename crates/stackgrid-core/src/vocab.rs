//! IRIs of the vocabularies the graph store records use.

/// Core namespace: statuses, classes, and trigger predicates.
pub const SWARMUI: &str = "http://swarmui.semte.ch/vocabularies/core/";
pub const MU: &str = "http://mu.semte.ch/vocabularies/core/";
pub const DCT: &str = "http://purl.org/dc/terms/";
pub const DOAP: &str = "http://usefulinc.com/ns/doap#";
pub const RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const MU_UUID: &str = "http://mu.semte.ch/vocabularies/core/uuid";
pub const DCT_TITLE: &str = "http://purl.org/dc/terms/title";
pub const DOAP_LOCATION: &str = "http://usefulinc.com/ns/doap#location";
pub const DOAP_STACK: &str = "http://usefulinc.com/ns/doap#Stack";

pub const PIPELINE_CLASS: &str = "http://swarmui.semte.ch/vocabularies/core/Pipeline";
pub const SERVICE_CLASS: &str = "http://swarmui.semte.ch/vocabularies/core/Service";

pub const STATUS: &str = "http://swarmui.semte.ch/vocabularies/core/status";
pub const REQUESTED_STATUS: &str = "http://swarmui.semte.ch/vocabularies/core/requestedStatus";
pub const RESTART_REQUESTED: &str = "http://swarmui.semte.ch/vocabularies/core/restartRequested";
pub const DELETE_REQUESTED: &str = "http://swarmui.semte.ch/vocabularies/core/deleteRequested";
pub const UPDATE_REQUESTED: &str = "http://swarmui.semte.ch/vocabularies/core/updateRequested";
pub const SCALING: &str = "http://swarmui.semte.ch/vocabularies/core/scaling";
pub const REQUESTED_SCALING: &str = "http://swarmui.semte.ch/vocabularies/core/requestedScaling";
pub const SERVICES: &str = "http://swarmui.semte.ch/vocabularies/core/services";
pub const PIPELINES: &str = "http://swarmui.semte.ch/vocabularies/core/pipelines";
pub const BRANCH: &str = "http://swarmui.semte.ch/vocabularies/core/branch";

/// Default base for resource IRIs (`<base><type>/<uuid>`).
pub const DEFAULT_BASE_RESOURCE: &str = "http://swarm-ui.big-data-europe.eu/resources/";

/// `PREFIX` header prepended to every query sent to the store.
pub fn prefixes() -> String {
    format!(
        "PREFIX swarmui: <{SWARMUI}>\n\
         PREFIX mu: <{MU}>\n\
         PREFIX dct: <{DCT}>\n\
         PREFIX doap: <{DOAP}>\n\
         PREFIX rdf: <{RDF}>\n"
    )
}
