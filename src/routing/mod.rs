pub mod resolver;
pub mod wire;

pub use resolver::RouteResolver;
pub use wire::{parse_routing_table, RoutingBlock};
