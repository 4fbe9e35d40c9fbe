// Standard modules
pub const SATOSHIS_PER_COIN: u64 = 100_000_000;

/*
 * One long dependent chain of transactions. Every round spends the chain's
 * current unspent output and records the broadcast id as the new tip, so the
 * chain never runs out of spendable outputs, only of value.
 */
#[derive(Debug, Clone)]
pub struct TxChain {
    pub current_unspent_tx: String, // txid of the spendable output, overwritten on every hop
    pub address: String,            // spending address, fixed for the chain's lifetime
    pub secret_key: String,         // WIF key for the address, fixed for the chain's lifetime
    pub amount: u64,                // satoshis; shrinks by half the fee each hop
}

/*
 * The fixed second party every chain co-spends with. Created once per node
 * before workload generation starts and never replaced.
 */
#[derive(Debug, Clone)]
pub struct SpendTarget {
    pub address: String,
    pub secret_key: String,
}

/*
 * Everything the assembler needs to build one recycling transaction: two
 * inputs (outputs 0 and 1 of the previous round's transaction, owned by the
 * chain and the spend target respectively) and two value-equal outputs paying
 * each party back.
 */
#[derive(Debug)]
pub struct RecycleTxRequest<'a> {
    pub prev_txid: &'a str,
    pub chain_address: &'a str,
    pub chain_secret_key: &'a str,
    pub target_address: &'a str,
    pub target_secret_key: &'a str,
    pub output_amount: u64, // satoshis paid to each of the two outputs
}

/*
 * Local transaction construction and signing. The signature scheme is fixed
 * (sign the all-inputs-all-outputs commitment per input, attach the signature
 * as the input script); the serialization primitives behind it are supplied
 * by the embedding scenario.
 */
pub trait TxAssembler: Send + Sync {
    // Returns the signed transaction as raw hex, ready for sendrawtransaction.
    fn assemble_recycle_tx(&self, request: &RecycleTxRequest<'_>) -> anyhow::Result<String>;
}

pub fn btc_to_satoshi(amount: f64) -> u64 {
    (amount * SATOSHIS_PER_COIN as f64).round() as u64
}

pub fn satoshi_to_btc_string(amount: u64) -> String {
    format!("{:.8}", amount as f64 / SATOSHIS_PER_COIN as f64)
}
