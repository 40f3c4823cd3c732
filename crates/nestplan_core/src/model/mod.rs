mod accounts;
mod assumptions;
mod benefits;
mod expenses;
mod household;
mod ids;
mod income;
mod market;
mod results;
mod tax_tables;
mod withdrawal_schedule;

pub use accounts::{
    ASSET_MIX_TOLERANCE, Account, AccountKind, AssetClass, AssetMix, Owner, WithdrawalTaxation,
};
pub use assumptions::{
    AssetClassAssumption, AssumptionSet, BlackSwan, DistributionRates, DistributionYields,
    GlidePath, GlidePoint, InflationAssumptions, ReturnAssumptions, SpendingSmile,
};
pub use benefits::{BenefitRules, ContributionRules, CppRules, OasRules, PensionSplitRules};
pub use expenses::{Expense, ExpenseCategory, ExpenseKind};
pub use household::{Household, Person, Province};
pub use ids::{AccountId, PersonId};
pub use income::{CppEntitlement, IncomeKind, IncomeSource, OasEntitlement, Timing};
pub use market::{ClassReturns, HistoricalReturns, MarketPath, ReturnDistribution, ReturnModel};
pub use results::{
    AccountYear, IncomeBreakdown, MonteCarloConfig, MonteCarloProgress, PERCENTILE_TOLERANCE,
    PensionSplit, PercentileBand, PersonTax, PersonYear, ProjectionResult, ProjectionYear,
    RoomYear, SimulationResult, SpendingSolution, TerminalState, TrialOutcome,
    find_percentile_value,
};
pub use tax_tables::{BracketSchedule, Jurisdiction, JurisdictionTable, TaxBracket, TaxTables};
pub use withdrawal_schedule::{MinimumWithdrawalEntry, MinimumWithdrawalTable};
