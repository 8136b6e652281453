/**
 * FLEET KERNEL - Réconciliation des inventaires de la flotte
 *
 * RÔLE : Fusionne trois inventaires (cloud, gestion de configuration,
 * monitoring) en un registre d'hôtes indexé par IP, détecte les orphelins
 * et applique la politique de péremption de 45 jours.
 *
 * ARCHITECTURE : collaborateurs derrière des traits (clients), ingestion par
 * source (ingest), registre (registry), disposition des orphelins (orphans),
 * rapports CSV (report), pilotage d'une passe (reconciler).
 */

pub mod clients;
pub mod config;
pub mod coverage;
pub mod error;
pub mod ingest;
pub mod models;
pub mod normalize;
pub mod orphans;
pub mod reconciler;
pub mod registry;
pub mod report;
pub mod staleness;
pub mod stats;

pub use error::{ReconcileError, ReconcileResult};
pub use reconciler::{Collaborators, ReconcileOutcome, Reconciler, ReconcilerSettings};
pub use registry::HostRegistry;
