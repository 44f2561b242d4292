// Domain layer: entities, results and the ports the sync core depends on.

pub mod model;
pub mod ports;
