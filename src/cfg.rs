//! Basic-block partition and control-flow graph.
//!
//! The partition pass cuts a code block's linear instruction stream at
//! every jump target. The graph pass connects the resulting blocks with
//! fall-through and jump edges and computes the dominator tree; an edge
//! whose target dominates its source is a back-edge, and its target is a
//! loop header. The lifter consults the header set when classifying
//! backward jumps.

use std::collections::{BTreeSet, HashMap, HashSet};

use petgraph::algo::dominators::{self, Dominators};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::bytecode::{BasicBlock, CodeBlock, OpCode};

/// Collect every absolute jump-target offset in the block. `UNWIND_JUMP`
/// carries two targets; both count.
pub fn jump_targets(block: &CodeBlock) -> BTreeSet<u32> {
    let mut targets = BTreeSet::new();
    for instr in &block.instructions {
        if instr.opcode.is_jump() {
            targets.extend(instr.jump_targets());
        }
    }
    targets
}

/// Partition the block's instructions into basic blocks, cutting at
/// `sorted(jump_targets) ∪ {0}`. A target past the last instruction
/// designates end-of-block and produces no synthetic block.
pub fn build_basic_blocks(block: &mut CodeBlock) {
    block.basic_blocks.clear();
    if block.instructions.is_empty() {
        return;
    }

    let targets = jump_targets(block);
    if targets.is_empty() {
        let entry = block.instructions[0].offset;
        block
            .basic_blocks
            .push(BasicBlock::new(entry, 0, block.instructions.len()));
        return;
    }

    let mut cuts = targets;
    cuts.insert(0);
    let cuts: Vec<u32> = cuts.into_iter().collect();

    for (i, &cut) in cuts.iter().enumerate() {
        let start = block.index_at_or_after(cut);
        let end = match cuts.get(i + 1) {
            Some(&next) => block.index_at_or_after(next),
            None => block.instructions.len(),
        };
        if start < end {
            let entry = block.instructions[start].offset;
            block.basic_blocks.push(BasicBlock::new(entry, start, end));
        }
    }
}

/// The block-level control-flow graph of one code block.
pub struct Cfg {
    graph: DiGraph<usize, ()>,
    nodes: Vec<NodeIndex>,
    /// Entry offsets of basic blocks targeted by a back-edge.
    loop_headers: HashSet<u32>,
}

impl Cfg {
    pub fn is_loop_header(&self, offset: u32) -> bool {
        self.loop_headers.contains(&offset)
    }

    pub fn block_count(&self) -> usize {
        self.nodes.len()
    }

    /// Successor basic-block indices of basic block `i`.
    pub fn successors(&self, i: usize) -> Vec<usize> {
        self.graph
            .neighbors(self.nodes[i])
            .map(|n| self.graph[n])
            .collect()
    }
}

/// Build the CFG for a block whose basic blocks are already partitioned.
pub fn build_cfg(block: &CodeBlock) -> Cfg {
    let mut graph = DiGraph::new();
    let nodes: Vec<NodeIndex> = (0..block.basic_blocks.len())
        .map(|i| graph.add_node(i))
        .collect();

    // Entry offset → basic block index, for resolving jump targets.
    let entries: HashMap<u32, usize> = block
        .basic_blocks
        .iter()
        .enumerate()
        .map(|(i, bb)| (block.instructions[bb.start].offset, i))
        .collect();

    // The partition cuts only at jump targets, so a conditional jump may
    // sit mid-block; every instruction contributes its edges.
    for (i, bb) in block.basic_blocks.iter().enumerate() {
        for instr in &block.instructions[bb.start..bb.end] {
            if instr.opcode.is_jump() {
                connect(&mut graph, &nodes, &entries, i, instr.jump_targets());
            } else if instr.opcode == OpCode::ForIter {
                // The iterator-exhausted branch: offset + delta.
                if let Some(delta) = instr.uint_operand() {
                    connect(&mut graph, &nodes, &entries, i, vec![instr.offset + delta]);
                }
            }
        }
        let last = &block.instructions[bb.end - 1];
        let ends_flow = matches!(
            last.opcode,
            OpCode::Jump | OpCode::UnwindJump | OpCode::ReturnValue
        );
        if !ends_flow && i + 1 < nodes.len() {
            graph.add_edge(nodes[i], nodes[i + 1], ());
        }
    }

    let loop_headers = find_loop_headers(block, &graph, &nodes);

    Cfg {
        graph,
        nodes,
        loop_headers,
    }
}

fn connect(
    graph: &mut DiGraph<usize, ()>,
    nodes: &[NodeIndex],
    entries: &HashMap<u32, usize>,
    from: usize,
    targets: Vec<u32>,
) {
    for target in targets {
        if let Some(&to) = entries.get(&target) {
            graph.add_edge(nodes[from], nodes[to], ());
        }
    }
}

fn find_loop_headers(
    block: &CodeBlock,
    graph: &DiGraph<usize, ()>,
    nodes: &[NodeIndex],
) -> HashSet<u32> {
    let mut headers = HashSet::new();
    let Some(&root) = nodes.first() else {
        return headers;
    };
    let doms = dominators::simple_fast(graph, root);

    for edge in graph.edge_references() {
        if dominates(&doms, edge.target(), edge.source()) {
            let bb = &block.basic_blocks[graph[edge.target()]];
            headers.insert(block.instructions[bb.start].offset);
        }
    }
    headers
}

/// True when `a` dominates `b` (every path from entry to `b` passes
/// through `a`). Walks `b`'s idom chain; unreachable nodes dominate
/// nothing.
fn dominates(doms: &Dominators<NodeIndex>, a: NodeIndex, b: NodeIndex) -> bool {
    let mut node = b;
    loop {
        if node == a {
            return true;
        }
        match doms.immediate_dominator(node) {
            Some(idom) => node = idom,
            None => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{CodeBlock, Instruction, OpCode};

    fn block_of(rows: &[(u32, &str, &str)]) -> CodeBlock {
        let mut cb = CodeBlock::new("<module>".into(), "t.py".into(), "d0".into());
        for &(offset, opcode, operands) in rows {
            cb.push_instruction(Instruction::new(
                offset,
                OpCode::parse(opcode),
                operands.to_string(),
                None,
            ));
        }
        cb
    }

    #[test]
    fn test_no_jumps_single_block() {
        let mut cb = block_of(&[
            (0, "LOAD_CONST_SMALL_INT", "1"),
            (2, "STORE_NAME", "x"),
            (4, "LOAD_CONST_NONE", ""),
            (5, "RETURN_VALUE", ""),
        ]);
        build_basic_blocks(&mut cb);
        assert_eq!(cb.basic_blocks.len(), 1);
        assert_eq!(cb.basic_blocks[0].label, "L0");
        assert_eq!((cb.basic_blocks[0].start, cb.basic_blocks[0].end), (0, 4));
    }

    #[test]
    fn test_partition_totality_and_order() {
        let mut cb = block_of(&[
            (0, "LOAD_NAME", "x"),
            (2, "POP_JUMP_IF_FALSE", "8"),
            (4, "LOAD_NAME", "f"),
            (6, "JUMP", "10"),
            (8, "LOAD_NAME", "g"),
            (10, "LOAD_CONST_NONE", ""),
            (11, "RETURN_VALUE", ""),
        ]);
        build_basic_blocks(&mut cb);

        // Union of block ranges covers every instruction exactly once, in order.
        let mut covered = Vec::new();
        for bb in &cb.basic_blocks {
            covered.extend(bb.start..bb.end);
        }
        assert_eq!(covered, (0..cb.instructions.len()).collect::<Vec<_>>());

        let labels: Vec<&str> = cb.basic_blocks.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["L0", "L8", "L10"]);
    }

    #[test]
    fn test_jump_closure() {
        let mut cb = block_of(&[
            (0, "POP_JUMP_IF_TRUE", "6"),
            (2, "LOAD_NAME", "a"),
            (4, "JUMP", "8"),
            (6, "LOAD_NAME", "b"),
            (8, "RETURN_VALUE", ""),
        ]);
        build_basic_blocks(&mut cb);
        let entries: BTreeSet<u32> = cb
            .basic_blocks
            .iter()
            .map(|bb| cb.instructions[bb.start].offset)
            .collect();
        for target in jump_targets(&cb) {
            assert!(entries.contains(&target), "target {} has no block", target);
        }
    }

    #[test]
    fn test_unwind_jump_contributes_two_targets() {
        let cb = block_of(&[
            (0, "UNWIND_JUMP", "6 1"),
            (3, "LOAD_NAME", "a"),
            (6, "RETURN_VALUE", ""),
        ]);
        let targets = jump_targets(&cb);
        assert!(targets.contains(&6));
        assert!(targets.contains(&1));
    }

    #[test]
    fn test_jump_past_end_makes_no_block() {
        let mut cb = block_of(&[
            (0, "LOAD_NAME", "x"),
            (2, "POP_JUMP_IF_FALSE", "99"),
            (4, "RETURN_VALUE", ""),
        ]);
        build_basic_blocks(&mut cb);
        // 99 is past the stream: blocks exist only for 0 and nothing empty.
        assert!(cb.basic_blocks.iter().all(|bb| bb.start < bb.end));
        let labels: Vec<&str> = cb.basic_blocks.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["L0"]);
    }

    #[test]
    fn test_while_pattern_has_loop_header() {
        // JUMP to test; body; test; conditional jump back to body.
        let mut cb = block_of(&[
            (0, "JUMP", "8"),
            (2, "LOAD_NAME", "f"),
            (4, "CALL_FUNCTION", "n=0 nkw=0"),
            (6, "POP_TOP", ""),
            (8, "LOAD_NAME", "x"),
            (10, "POP_JUMP_IF_TRUE", "2"),
            (12, "LOAD_CONST_NONE", ""),
            (13, "RETURN_VALUE", ""),
        ]);
        build_basic_blocks(&mut cb);
        let cfg = build_cfg(&cb);
        // The body (L2) is reachable only through the test (L8), so the
        // fall-through edge L2 -> L8 is the back-edge: L8 is the header.
        assert!(cfg.is_loop_header(8));
        assert!(!cfg.is_loop_header(2));
        assert_eq!(cfg.block_count(), 3);
        // Test block branches back into the body.
        assert!(cfg.successors(2).contains(&1));
    }

    #[test]
    fn test_straight_line_has_no_loop_headers() {
        let mut cb = block_of(&[
            (0, "LOAD_CONST_SMALL_INT", "1"),
            (2, "STORE_NAME", "x"),
            (4, "LOAD_CONST_NONE", ""),
            (5, "RETURN_VALUE", ""),
        ]);
        build_basic_blocks(&mut cb);
        let cfg = build_cfg(&cb);
        assert!(!cfg.is_loop_header(0));
    }
}
