pub mod dot;
pub mod graph;

#[cfg(test)]
mod test_graph;
