/// LDPC encoding implementation for 5G NR
/// Based on 3GPP TS 38.212 Section 5.3.2

use tracing::debug;

/// LDPC base graph types
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LdpcBaseGraph {
    /// Base graph 1 - for larger transport blocks
    BaseGraph1,
    /// Base graph 2 - for smaller transport blocks
    BaseGraph2,
}

/// LDPC lifting size sets as per Table 5.3.2-1
const LIFTING_SIZE_SET: [usize; 51] = [
    2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 18, 20, 22, 24,
    26, 28, 30, 32, 36, 40, 44, 48, 52, 56, 60, 64, 72, 80, 88, 96, 104,
    112, 120, 128, 144, 160, 176, 192, 208, 224, 240, 256, 288, 320, 352, 384
];

/// Maximum code block size for each base graph
const MAX_CB_SIZE_BG1: usize = 8448;
const MAX_CB_SIZE_BG2: usize = 3840;

/// LDPC encoder configuration
pub struct LdpcConfig {
    /// Base graph type
    pub base_graph: LdpcBaseGraph,
    /// Lifting size (Z)
    pub lifting_size: usize,
    /// Number of information bits (K)
    pub num_info_bits: usize,
    /// Number of encoded bits (N)
    pub num_encoded_bits: usize,
}

impl LdpcConfig {
    /// Create LDPC configuration based on code block size
    pub fn new(code_block_size: usize) -> Self {
        // Determine base graph based on code block size and rate
        let base_graph = if code_block_size > 640 {
            LdpcBaseGraph::BaseGraph1
        } else if code_block_size > 308 {
            LdpcBaseGraph::BaseGraph1
        } else {
            LdpcBaseGraph::BaseGraph2
        };
        
        // Calculate lifting size
        let (k_b, lifting_size) = match base_graph {
            LdpcBaseGraph::BaseGraph1 => {
                let k_b = 22;
                let min_z = ((code_block_size as f32) / (k_b as f32)).ceil() as usize;
                let z = LIFTING_SIZE_SET.iter()
                    .find(|&&z| z >= min_z)
                    .copied()
                    .unwrap_or(384);
                (k_b, z)
            }
            LdpcBaseGraph::BaseGraph2 => {
                let k_b = 10;
                let min_z = ((code_block_size as f32) / (k_b as f32)).ceil() as usize;
                let z = LIFTING_SIZE_SET.iter()
                    .find(|&&z| z >= min_z)
                    .copied()
                    .unwrap_or(384);
                (k_b, z)
            }
        };
        
        // Calculate number of systematic bits
        let num_info_bits = k_b * lifting_size;
        
        // Calculate total encoded bits
        let num_encoded_bits = match base_graph {
            LdpcBaseGraph::BaseGraph1 => 66 * lifting_size,
            LdpcBaseGraph::BaseGraph2 => 50 * lifting_size,
        };
        
        Self {
            base_graph,
            lifting_size,
            num_info_bits,
            num_encoded_bits,
        }
    }
}

/// LDPC encoder
pub struct LdpcEncoder {
    // Parity check matrices for each configuration
    // In a real implementation, these would be pre-computed based on 3GPP tables
}

impl LdpcEncoder {
    pub fn new() -> Self {
        Self {}
    }
    
    /// Encode a code block using LDPC
    pub fn encode(&self, input: &[u8], config: &LdpcConfig) -> Vec<u8> {
        let input_bits = input.len() * 8;
        
        debug!(
            "LDPC encoding: input_bits={}, base_graph={:?}, lifting_size={}, K={}, N={}",
            input_bits, config.base_graph, config.lifting_size, 
            config.num_info_bits, config.num_encoded_bits
        );
        
        // Convert input bytes to bits
        let mut info_bits = vec![0u8; config.num_info_bits];
        let mut bit_idx = 0;
        for byte in input {
            for i in (0..8).rev() {
                if bit_idx < config.num_info_bits {
                    info_bits[bit_idx] = (byte >> i) & 1;
                    bit_idx += 1;
                }
            }
        }
        
        // Pad with zeros if necessary
        while bit_idx < config.num_info_bits {
            info_bits[bit_idx] = 0;
            bit_idx += 1;
        }
        
        // Perform LDPC encoding
        let encoded_bits = match config.base_graph {
            LdpcBaseGraph::BaseGraph1 => self.encode_base_graph_1(&info_bits, config),
            LdpcBaseGraph::BaseGraph2 => self.encode_base_graph_2(&info_bits, config),
        };
        
        // Convert bits back to bytes
        let mut output = Vec::with_capacity((encoded_bits.len() + 7) / 8);
        for chunk in encoded_bits.chunks(8) {
            let mut byte = 0u8;
            for (i, &bit) in chunk.iter().enumerate() {
                byte |= bit << (7 - i);
            }
            output.push(byte);
        }
        
        output
    }
    
    /// Encode using base graph 1
    fn encode_base_graph_1(&self, info_bits: &[u8], config: &LdpcConfig) -> Vec<u8> {
        let z = config.lifting_size;
        let mut encoded = vec![0u8; config.num_encoded_bits];
        
        // Copy systematic bits
        encoded[..info_bits.len()].copy_from_slice(info_bits);
        
        // Generate parity bits using simplified LDPC encoding
        // In a real implementation, this would use the actual parity check matrix
        // from 3GPP TS 38.212 Table 5.3.2-2
        
        // For now, we implement a basic parity generation that maintains
        // the structure of LDPC encoding
        
        // First set of parity bits (2*Z bits)
        for i in 0..2*z {
            let mut parity = 0u8;
            // Simple parity calculation - XOR selected info bits
            for j in 0..22 {
                if (i + j) % 3 == 0 {
                    parity ^= info_bits[j * z + (i % z)];
                }
            }
            encoded[22 * z + i] = parity;
        }
        
        // Remaining parity bits
        for block in 0..42 {
            for i in 0..z {
                let mut parity = 0u8;
                // Calculate parity based on previous bits
                let base_idx = 24 * z + block * z + i;
                if base_idx < encoded.len() {
                    // XOR with selected previous bits
                    for j in 0..10 {
                        let idx = (base_idx + j * 7) % (24 * z);
                        parity ^= encoded[idx];
                    }
                    encoded[base_idx] = parity;
                }
            }
        }
        
        encoded
    }
    
    /// Encode using base graph 2
    fn encode_base_graph_2(&self, info_bits: &[u8], config: &LdpcConfig) -> Vec<u8> {
        let z = config.lifting_size;
        let mut encoded = vec![0u8; config.num_encoded_bits];
        
        // Copy systematic bits
        encoded[..info_bits.len()].copy_from_slice(info_bits);
        
        // Generate parity bits using simplified LDPC encoding
        // In a real implementation, this would use the actual parity check matrix
        // from 3GPP TS 38.212 Table 5.3.2-3
        
        // First set of parity bits (4*Z bits)
        for i in 0..4*z {
            let mut parity = 0u8;
            // Simple parity calculation
            for j in 0..10 {
                if (i + j) % 2 == 0 {
                    parity ^= info_bits[j * z + (i % z)];
                }
            }
            encoded[10 * z + i] = parity;
        }
        
        // Remaining parity bits
        for block in 0..36 {
            for i in 0..z {
                let mut parity = 0u8;
                let base_idx = 14 * z + block * z + i;
                if base_idx < encoded.len() {
                    // XOR with selected previous bits
                    for j in 0..8 {
                        let idx = (base_idx + j * 5) % (14 * z);
                        parity ^= encoded[idx];
                    }
                    encoded[base_idx] = parity;
                }
            }
        }
        
        encoded
    }
}

/// LDPC rate matcher
pub struct LdpcRateMatcher;

impl LdpcRateMatcher {
    /// Rate match LDPC encoded bits
    pub fn rate_match(
        &self,
        encoded_bits: &[u8],
        target_bits: usize,
        rv: u8,
        config: &LdpcConfig,
    ) -> Vec<u8> {
        let n = encoded_bits.len();
        let mut output = vec![0u8; target_bits];
        
        // Calculate starting position based on redundancy version
        let rv_idx = rv as usize;
        let start_pos = match config.base_graph {
            LdpcBaseGraph::BaseGraph1 => {
                // RV starting positions for BG1
                match rv_idx {
                    0 => 0,
                    1 => (17 * n) / 66,
                    2 => (33 * n) / 66,
                    3 => (56 * n) / 66,
                    _ => 0,
                }
            }
            LdpcBaseGraph::BaseGraph2 => {
                // RV starting positions for BG2
                match rv_idx {
                    0 => 0,
                    1 => (13 * n) / 50,
                    2 => (25 * n) / 50,
                    3 => (43 * n) / 50,
                    _ => 0,
                }
            }
        };
        
        // Circular buffer rate matching
        for i in 0..target_bits {
            let idx = (start_pos + i) % n;
            output[i] = encoded_bits[idx];
        }
        
        debug!(
            "Rate matched {} bits to {} bits (RV={}, start={})",
            n, target_bits, rv, start_pos
        );
        
        output
    }
}

/// Complete LDPC encoder for PDSCH
pub struct PdschLdpcEncoder {
    encoder: LdpcEncoder,
    rate_matcher: LdpcRateMatcher,
}

impl PdschLdpcEncoder {
    pub fn new() -> Self {
        Self {
            encoder: LdpcEncoder::new(),
            rate_matcher: LdpcRateMatcher,
        }
    }
    
    /// Encode a code block with LDPC
    pub fn encode(&self, code_block: &[u8], target_bits: usize, rv: u8) -> Vec<u8> {
        // Create LDPC configuration
        let config = LdpcConfig::new(code_block.len() * 8);
        
        // Encode
        let encoded = self.encoder.encode(code_block, &config);
        
        // Convert encoded bytes to bits for rate matching
        let mut encoded_bits = Vec::with_capacity(encoded.len() * 8);
        for byte in &encoded {
            for i in (0..8).rev() {
                encoded_bits.push((byte >> i) & 1);
            }
        }
        
        // Rate match
        let rate_matched_bits = self.rate_matcher.rate_match(
            &encoded_bits,
            target_bits,
            rv,
            &config,
        );
        
        // Convert back to bytes
        let mut output = Vec::with_capacity((rate_matched_bits.len() + 7) / 8);
        for chunk in rate_matched_bits.chunks(8) {
            let mut byte = 0u8;
            for (i, &bit) in chunk.iter().enumerate() {
                byte |= bit << (7 - i);
            }
            output.push(byte);
        }
        
        output
    }
}