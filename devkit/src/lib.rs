/*!
# Fleet DevKit - Stubs et utilitaires de test

Bibliothèque facilitant les tests du réconciliateur avec:
- Stubs en mémoire des trois collaborateurs (cloud, gestion de config, monitoring)
- Constructeurs de descripteurs
- Harness avec horloge fixe
*/

pub mod builders;
pub mod stubs;
pub mod test_utils;

pub use stubs::{MockCloud, MockConfigManagement, MockMonitoring};
pub use test_utils::TestHarness;
