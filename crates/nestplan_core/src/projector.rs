//! Return and inflation projector
//!
//! Turns the assumption set and a market path into the effective rates for
//! one projected year: class returns after any black-swan override, the
//! account's glide-path mix, cumulative inflation per expense category and
//! the spending-smile multiplier.

use crate::model::{
    Account, AssetMix, AssumptionSet, BlackSwan, ClassReturns, Expense, ExpenseCategory,
    MarketPath,
};

/// Effective rates for one projected year
#[derive(Debug, Clone, PartialEq)]
pub struct YearRates {
    pub year: i16,
    /// Years since the start year
    pub offset: usize,
    pub returns: ClassReturns,
    /// Cumulative general inflation since the start year
    pub general_index: f64,
    category_index: [f64; ExpenseCategory::ALL.len()],
    pub smile_multiplier: f64,
}

impl YearRates {
    #[must_use]
    pub fn category_index(&self, category: ExpenseCategory) -> f64 {
        self.category_index[category.index()]
    }

    /// Nominal amount of `expense` this year (zero when it does not occur)
    #[must_use]
    pub fn expense_amount(&self, expense: &Expense) -> f64 {
        if !expense.kind.occurs_in(self.year) {
            return 0.0;
        }
        let nominal = expense.amount * self.category_index(expense.category);
        if expense.discretionary {
            nominal * self.smile_multiplier
        } else {
            nominal
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReturnProjector<'a> {
    assumptions: &'a AssumptionSet,
    start_year: i16,
    black_swan: Option<BlackSwan>,
}

impl<'a> ReturnProjector<'a> {
    #[must_use]
    pub fn new(assumptions: &'a AssumptionSet, start_year: i16) -> Self {
        Self {
            assumptions,
            start_year,
            black_swan: assumptions.black_swan,
        }
    }

    /// Replace the shock (Monte Carlo trials with randomized timing)
    #[must_use]
    pub fn with_black_swan(mut self, black_swan: Option<BlackSwan>) -> Self {
        self.black_swan = black_swan;
        self
    }

    #[must_use]
    pub fn black_swan(&self) -> Option<&BlackSwan> {
        self.black_swan.as_ref()
    }

    #[must_use]
    pub fn rates_for(&self, year: i16, path: &MarketPath) -> YearRates {
        let offset = usize::try_from(i32::from(year) - i32::from(self.start_year)).unwrap_or(0);
        let exponent = i32::try_from(offset).unwrap_or(i32::MAX);

        let mut returns = path.year(offset);
        if let Some(equity) = self
            .black_swan
            .as_ref()
            .and_then(|shock| shock.equity_override(offset))
        {
            returns.equity = equity;
        }

        let inflation = &self.assumptions.inflation;
        let category_index = ExpenseCategory::ALL
            .map(|category| (1.0 + inflation.rate_for(category)).powi(exponent));

        YearRates {
            year,
            offset,
            returns,
            general_index: (1.0 + inflation.general).powi(exponent),
            category_index,
            smile_multiplier: self.assumptions.spending_smile.multiplier(year),
        }
    }

    /// Asset mix for an account whose reference person is `age`
    #[must_use]
    pub fn account_mix(&self, account: &Account, age: Option<u8>) -> AssetMix {
        match (&self.assumptions.glide_path, age) {
            (Some(glide), Some(age)) if account.follows_glide_path => glide
                .equity_weight(age)
                .map_or(account.asset_mix, |equity| account.asset_mix.with_equity(equity)),
            _ => account.asset_mix,
        }
    }

    #[must_use]
    pub fn account_return(&self, account: &Account, age: Option<u8>, rates: &YearRates) -> f64 {
        self.account_mix(account, age).blended_return(&rates.returns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AccountId, AccountKind, AssetClassAssumption, GlidePath, Owner, ReturnAssumptions,
        SpendingSmile,
    };

    fn assumptions() -> AssumptionSet {
        AssumptionSet {
            returns: ReturnAssumptions {
                equity: AssetClassAssumption::fixed(0.08),
                fixed_income: AssetClassAssumption::fixed(0.03),
                cash: AssetClassAssumption::fixed(0.01),
                real_estate: AssetClassAssumption::fixed(0.04),
            },
            ..AssumptionSet::default()
        }
    }

    fn account(mix: AssetMix) -> Account {
        Account {
            account_id: AccountId(1),
            name: "A".into(),
            kind: AccountKind::Rrsp,
            owner: Owner::Person(crate::model::PersonId(1)),
            balance: 100.0,
            asset_mix: mix,
            contribution_room: None,
            cost_basis: None,
            minimum_withdrawals: None,
            follows_glide_path: true,
        }
    }

    #[test]
    fn test_black_swan_overrides_only_equity() {
        let mut set = assumptions();
        set.black_swan = Some(BlackSwan {
            shock_year_offset: 5,
            magnitude: -0.30,
            recovery_years: 2,
            randomize_timing: false,
        });
        let path = MarketPath::deterministic(&set.returns, 10);
        let projector = ReturnProjector::new(&set, 2025);

        let equity = |year| projector.rates_for(year, &path).returns.equity;
        assert!((equity(2029) - 0.08).abs() < 1e-12);
        assert!((equity(2030) + 0.30).abs() < 1e-12);
        assert_eq!(equity(2031), 0.0);
        assert_eq!(equity(2032), 0.0);
        assert!((equity(2033) - 0.08).abs() < 1e-12);
        assert!((projector.rates_for(2030, &path).returns.fixed_income - 0.03).abs() < 1e-12);
    }

    #[test]
    fn test_healthcare_compounds_with_premium() {
        let mut set = assumptions();
        set.inflation.general = 0.02;
        set.inflation.healthcare_premium = 0.03;
        let path = MarketPath::deterministic(&set.returns, 5);
        let rates = ReturnProjector::new(&set, 2025).rates_for(2028, &path);

        let healthcare = rates.category_index(ExpenseCategory::Healthcare);
        assert!((healthcare - 1.05_f64.powi(3)).abs() < 1e-12);
        assert!((rates.category_index(ExpenseCategory::Food) - 1.02_f64.powi(3)).abs() < 1e-12);
        assert!((rates.general_index - 1.02_f64.powi(3)).abs() < 1e-12);
    }

    #[test]
    fn test_smile_scales_discretionary_only() {
        let mut set = assumptions();
        set.inflation.general = 0.0;
        set.inflation.healthcare_premium = 0.0;
        set.spending_smile = SpendingSmile {
            retirement_year: Some(2025),
            decline_rate: 0.10,
            decline_years: 5,
            flat_years: 5,
            rise_rate: 0.0,
        };
        let path = MarketPath::deterministic(&set.returns, 5);
        let rates = ReturnProjector::new(&set, 2025).rates_for(2026, &path);

        let travel =
            Expense::recurring("Travel", 10_000.0, ExpenseCategory::Travel).discretionary();
        let rent = Expense::recurring("Rent", 10_000.0, ExpenseCategory::Housing);
        assert!((rates.expense_amount(&travel) - 9_000.0).abs() < 1e-9);
        assert!((rates.expense_amount(&rent) - 10_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_glide_path_sets_equity_weight() {
        let mut set = assumptions();
        set.glide_path = Some(GlidePath::linear(60, 0.8, 80, 0.4));
        let projector = ReturnProjector::new(&set, 2025);
        let acct = account(AssetMix::new(0.6, 0.3, 0.1, 0.0));

        let mix = projector.account_mix(&acct, Some(70));
        assert!((mix.equity - 0.6).abs() < 1e-12);
        assert!(mix.is_normalized());

        let mut fixed = acct.clone();
        fixed.follows_glide_path = false;
        assert_eq!(projector.account_mix(&fixed, Some(80)), fixed.asset_mix);
    }
}
